mod tests_seek;

// Robustness
mod tests_corruption;
