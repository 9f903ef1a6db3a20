//! Corruption detection tests.
//!
//! Every test starts from valid bytes, damages them, and checks that the
//! damage surfaces as [`BlockError::Corruption`] instead of a panic or a
//! wrong answer.
//!
//! Coverage:
//! - Footer and restart-index validation in `Block::new`
//! - Record header damage found while scanning or seeking
//! - Sticky cursor status after an error
//! - Every truncation of realistic and randomized blocks

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use crate::block::{Block, BlockBuilder, BlockError, BlockOptions};
    use tracing::Level;
    use tracing_subscriber::fmt::Subscriber;

    fn init_tracing() {
        let _ = Subscriber::builder()
            .with_max_level(Level::TRACE)
            .try_init();
    }

    /// `a, ab, abc, b` with restart interval 2.
    ///
    /// ```text
    /// offset  0: [0][1][1] a 1
    /// offset  5: [1][1][1] b 2
    /// offset 10: [0][3][1] abc 3   (restart)
    /// offset 17: [0][1][1] b 4
    /// offset 22: restarts [0, 10], count 2
    /// ```
    fn small_block() -> Vec<u8> {
        let mut b = BlockBuilder::new(BlockOptions { restart_interval: 2 }).unwrap();
        b.add(b"a", b"1").unwrap();
        b.add(b"ab", b"2").unwrap();
        b.add(b"abc", b"3").unwrap();
        b.add(b"b", b"4").unwrap();
        b.finish().unwrap().to_vec()
    }

    fn is_corruption<T>(result: &Result<T, BlockError>) -> bool {
        matches!(result, Err(BlockError::Corruption(_)))
    }

    /// Scans the whole block, returning the first error.
    fn scan(bytes: &[u8]) -> Result<usize, BlockError> {
        let block = Block::new(bytes)?;
        let mut count = 0;
        for entry in block.entries() {
            entry?;
            count += 1;
        }
        Ok(count)
    }

    // ----------------------------------------------------------------
    // Footer validation
    // ----------------------------------------------------------------

    #[test]
    fn too_short_for_restart_count() {
        init_tracing();
        for len in 0..4 {
            assert!(is_corruption(&Block::new(&[0u8; 4][..len])), "len {len}");
        }
    }

    /// The encoder always writes restart 0, so a zero count is never valid.
    /// A block starting with the entry `("", "")` cut to 4 bytes looks
    /// exactly like this.
    #[test]
    fn zero_restarts_rejected() {
        let bytes = [0u8, 0, 0, 0];
        assert!(is_corruption(&Block::new(&bytes)));

        let bytes = [0u8, 1, 1, b'a', b'1', 0, 0, 0, 0];
        assert!(is_corruption(&Block::new(&bytes)));
    }

    #[test]
    fn empty_first_entry_truncated_to_count() {
        let mut b = BlockBuilder::new(BlockOptions { restart_interval: 2 }).unwrap();
        b.add(b"", b"").unwrap();
        b.add(b"a", b"x").unwrap();
        b.add(b"ab", b"y").unwrap();
        let bytes = b.finish().unwrap().to_vec();
        assert_eq!(&bytes[..4], [0, 0, 0, 0]);
        assert_eq!(scan(&bytes), Ok(3));

        assert!(is_corruption(&scan(&bytes[..4])));
    }

    #[test]
    fn restart_count_exceeds_block() {
        let bytes = [0u8, 0, 0, 0, 2, 0, 0, 0];
        assert!(is_corruption(&Block::new(&bytes)));

        let bytes = [0xffu8; 4];
        assert!(is_corruption(&Block::new(&bytes)));
    }

    #[test]
    fn first_restart_not_zero() {
        let mut bytes = small_block();
        bytes[22] = 5;
        assert!(is_corruption(&Block::new(&bytes)));
    }

    #[test]
    fn restarts_not_increasing() {
        let mut bytes = small_block();
        bytes[26] = 0;
        assert!(is_corruption(&Block::new(&bytes)));
    }

    #[test]
    fn restart_outside_record_region() {
        let mut bytes = small_block();
        bytes[26] = 22;
        assert!(is_corruption(&Block::new(&bytes)));
    }

    // ----------------------------------------------------------------
    // Record damage
    // ----------------------------------------------------------------

    /// # Scenario
    /// Point the second restart at offset 12, inside the `abc` record.
    ///
    /// # Expected behavior
    /// - `Block::new` accepts the index (offsets are ordered and in range).
    /// - A scan fails once a record steps over the restart offset.
    /// - A seek fails when the binary search lands on the bogus restart.
    #[test]
    fn restart_inside_record() {
        init_tracing();

        let mut bytes = small_block();
        bytes[26] = 12;
        let block = Block::new(&bytes).unwrap();

        assert!(is_corruption(&scan(&bytes)));
        assert!(is_corruption(&block.iter().seek(b"b")));
    }

    /// The `ab` record claims to share 2 bytes with the 1-byte key `a`.
    #[test]
    fn shared_longer_than_previous_key() {
        init_tracing();

        let mut bytes = small_block();
        bytes[5] = 2;
        let block = Block::new(&bytes).unwrap();

        let mut iter = block.iter();
        iter.seek_to_first().unwrap();
        assert_eq!(iter.key(), b"a");
        assert!(is_corruption(&iter.next()));
        assert!(!iter.valid());
    }

    /// The first record of a restart run must not share bytes.
    #[test]
    fn nonzero_shared_at_restart() {
        let mut bytes = small_block();
        bytes[0] = 1;
        assert!(is_corruption(&scan(&bytes)));

        let mut bytes = small_block();
        bytes[10] = 1;
        assert!(is_corruption(&scan(&bytes)));
    }

    /// Rewriting `ab` as a full `a` yields a duplicate key.
    #[test]
    fn non_increasing_keys() {
        let mut bytes = small_block();
        bytes[5] = 0;
        bytes[8] = b'a';
        assert!(is_corruption(&scan(&bytes)));
    }

    /// Rewriting `b` as `a` after `abc` (across a restart) decreases the key.
    #[test]
    fn decreasing_key_after_restart() {
        let mut bytes = small_block();
        bytes[20] = b'a';
        assert!(is_corruption(&scan(&bytes)));
    }

    #[test]
    fn unshared_length_overruns_region() {
        let mut bytes = small_block();
        bytes[18] = 100;
        assert!(is_corruption(&scan(&bytes)));
    }

    #[test]
    fn value_length_overruns_region() {
        let mut bytes = small_block();
        bytes[19] = 0x7f;
        assert!(is_corruption(&scan(&bytes)));
    }

    /// A value length one byte too long makes the next record start past
    /// the restart offset.
    #[test]
    fn record_skips_restart() {
        let mut bytes = small_block();
        bytes[7] = 2;
        assert!(is_corruption(&scan(&bytes)));
    }

    /// Continuation bits run off the end of the record region.
    #[test]
    fn malformed_varint_header() {
        let mut bytes = small_block();
        bytes[17..22].fill(0x80);
        assert!(is_corruption(&scan(&bytes)));
    }

    // ----------------------------------------------------------------
    // Sticky status
    // ----------------------------------------------------------------

    /// # Scenario
    /// Hit a corrupt record, then try to reposition the cursor.
    ///
    /// # Expected behavior
    /// - `status()` holds the error.
    /// - Every later `seek_to_first`, `seek` and `next` returns that error
    ///   and leaves the cursor invalid.
    /// - `entries()` yields exactly one error and then ends.
    #[test]
    fn errors_are_sticky() {
        init_tracing();

        let mut bytes = small_block();
        bytes[18] = 100;
        let block = Block::new(&bytes).unwrap();

        let mut iter = block.iter();
        let err = iter.seek(b"b").unwrap_err();
        assert!(matches!(err, BlockError::Corruption(_)));
        assert_eq!(iter.status(), Some(&err));

        assert_eq!(iter.seek_to_first(), Err(err.clone()));
        assert_eq!(iter.seek(b"a"), Err(err.clone()));
        assert_eq!(iter.next(), Err(err.clone()));
        assert!(!iter.valid());
        assert_eq!(iter.key(), b"");

        let mut entries = block.entries();
        let mut seen_ok = 0;
        let mut seen_err = 0;
        for entry in &mut entries {
            match entry {
                Ok(_) => seen_ok += 1,
                Err(_) => seen_err += 1,
            }
        }
        assert_eq!((seen_ok, seen_err), (3, 1));
        assert!(entries.next().is_none());

        assert!(is_corruption(&block.get(b"b")));
    }

    // ----------------------------------------------------------------
    // Truncation
    // ----------------------------------------------------------------

    /// # Scenario
    /// Build a 100-entry block and decode every proper prefix of it.
    ///
    /// # Expected behavior
    /// Each truncated buffer is rejected by `Block::new` or fails while
    /// scanning. None decodes cleanly.
    #[test]
    fn every_truncation_detected() {
        init_tracing();

        let mut b = BlockBuilder::default();
        for i in 0..100 {
            b.add(format!("key{i:03}").as_bytes(), format!("value-{i}").as_bytes())
                .unwrap();
        }
        let bytes = b.finish().unwrap().to_vec();
        assert_eq!(scan(&bytes), Ok(100));

        for cut in 0..bytes.len() {
            let result = scan(&bytes[..cut]);
            assert!(is_corruption(&result), "cut {cut}: {result:?}");
        }
    }

    /// # Scenario
    /// 300 random blocks over a two-letter key alphabet, with short keys,
    /// small restart intervals, and an empty first entry in about a third
    /// of them. Decode every proper prefix of each.
    ///
    /// # Expected behavior
    /// No truncation decodes cleanly, including the 4-byte prefix of a
    /// block that starts with `("", "")`.
    #[test]
    fn every_truncation_of_random_blocks_detected() {
        init_tracing();

        let mut rng = StdRng::seed_from_u64(0x7E0C_A7ED);
        for round in 0..300 {
            let n = rng.random_range(0..=30);
            let keys: BTreeSet<Vec<u8>> = (0..n)
                .map(|_| {
                    let len = rng.random_range(0..=8);
                    (0..len).map(|_| b"ab"[rng.random_range(0..2)]).collect::<Vec<u8>>()
                })
                .collect();

            let interval = rng.random_range(1..=5);
            let empty_first = rng.random_bool(0.3);
            let mut b = BlockBuilder::new(BlockOptions { restart_interval: interval }).unwrap();
            let mut count = 0;
            for key in &keys {
                let value: Vec<u8> = if key.is_empty() && empty_first {
                    Vec::new()
                } else {
                    let len = rng.random_range(0..=6);
                    (0..len).map(|_| b"xyz"[rng.random_range(0..3)]).collect()
                };
                b.add(key, &value).unwrap();
                count += 1;
            }
            let bytes = b.finish().unwrap().to_vec();
            assert_eq!(scan(&bytes), Ok(count), "round {round}");

            for cut in 0..bytes.len() {
                let result = scan(&bytes[..cut]);
                assert!(is_corruption(&result), "round {round}, cut {cut}: {result:?}");
            }
        }
    }
}
