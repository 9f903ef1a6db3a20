//! Cursor positioning and point-lookup tests.
//!
//! Coverage:
//! - `seek` to present, absent, smaller and larger targets
//! - Scanning forward from a seek
//! - `get` hits and misses
//! - Cursor behavior on empty blocks and past the end

#[cfg(test)]
mod tests {
    use crate::block::{Block, BlockBuilder, BlockOptions};
    use tracing::Level;
    use tracing_subscriber::fmt::Subscriber;

    fn init_tracing() {
        let _ = Subscriber::builder()
            .with_max_level(Level::TRACE)
            .try_init();
    }

    /// `a, ab, abc, b` with restart interval 2.
    fn small_block() -> Vec<u8> {
        let mut b = BlockBuilder::new(BlockOptions { restart_interval: 2 }).unwrap();
        b.add(b"a", b"1").unwrap();
        b.add(b"ab", b"2").unwrap();
        b.add(b"abc", b"3").unwrap();
        b.add(b"b", b"4").unwrap();
        b.finish().unwrap().to_vec()
    }

    /// Even numbers 0, 2, ..., 198 as zero-padded keys.
    fn even_block(restart_interval: usize) -> Vec<u8> {
        let mut b = BlockBuilder::new(BlockOptions { restart_interval }).unwrap();
        for i in (0..200).step_by(2) {
            b.add(format!("{i:05}").as_bytes(), format!("v{i}").as_bytes())
                .unwrap();
        }
        b.finish().unwrap().to_vec()
    }

    // ----------------------------------------------------------------
    // seek
    // ----------------------------------------------------------------

    /// # Scenario
    /// Seek the four-entry block to exact, in-between, and out-of-range
    /// targets.
    ///
    /// # Expected behavior
    /// The cursor lands on the first key `>= target`, or is not valid when
    /// every key is smaller.
    #[test]
    fn seek_small_block() {
        init_tracing();

        let bytes = small_block();
        let block = Block::new(&bytes).unwrap();
        let mut iter = block.iter();

        let cases: [(&str, Option<(&str, &str)>); 8] = [
            ("", Some(("a", "1"))),
            ("a", Some(("a", "1"))),
            ("aa", Some(("ab", "2"))),
            ("ab", Some(("ab", "2"))),
            ("abc", Some(("abc", "3"))),
            ("abcd", Some(("b", "4"))),
            ("b", Some(("b", "4"))),
            ("c", None),
        ];

        for (target, expected) in cases {
            iter.seek(target.as_bytes()).unwrap();
            match expected {
                Some((key, value)) => {
                    assert!(iter.valid(), "target {target:?}");
                    assert_eq!(iter.key(), key.as_bytes());
                    assert_eq!(iter.value(), value.as_bytes());
                }
                None => assert!(!iter.valid(), "target {target:?}"),
            }
            assert!(iter.status().is_none());
        }
    }

    /// # Scenario
    /// Seek to `ab` and walk forward with `next`.
    ///
    /// # Expected behavior
    /// Yields `ab`, `abc`, `b`, then the cursor becomes invalid and further
    /// `next` calls are no-ops.
    #[test]
    fn seek_then_next() {
        let bytes = small_block();
        let block = Block::new(&bytes).unwrap();
        let mut iter = block.iter();

        iter.seek(b"ab").unwrap();
        let mut seen = Vec::new();
        while iter.valid() {
            seen.push(iter.key().to_vec());
            iter.next().unwrap();
        }
        assert_eq!(seen, [b"ab".to_vec(), b"abc".to_vec(), b"b".to_vec()]);

        iter.next().unwrap();
        assert!(!iter.valid());
    }

    /// Seek is absolute: a cursor can move backwards by seeking again.
    #[test]
    fn seek_backwards_after_scan() {
        let bytes = even_block(16);
        let block = Block::new(&bytes).unwrap();
        let mut iter = block.iter();

        iter.seek(b"00150").unwrap();
        assert_eq!(iter.key(), b"00150");
        iter.seek(b"00003").unwrap();
        assert_eq!(iter.key(), b"00004");
        iter.seek_to_first().unwrap();
        assert_eq!(iter.key(), b"00000");
    }

    /// # Scenario
    /// Seek to every key and to every gap between keys, across several
    /// restart intervals.
    ///
    /// # Expected behavior
    /// Present keys are found exactly; a gap lands on the next even key.
    #[test]
    fn seek_every_key_and_gap() {
        init_tracing();

        for interval in [1, 3, 16, 100] {
            let bytes = even_block(interval);
            let block = Block::new(&bytes).unwrap();
            let mut iter = block.iter();

            for i in 0..200 {
                iter.seek(format!("{i:05}").as_bytes()).unwrap();
                if i == 199 {
                    assert!(!iter.valid());
                    continue;
                }
                let expected = i + i % 2;
                assert_eq!(iter.key(), format!("{expected:05}").as_bytes());
                assert_eq!(iter.value(), format!("v{expected}").as_bytes());
            }
        }
    }

    /// Seeking past the last key leaves the cursor invalid without error.
    #[test]
    fn seek_past_end() {
        let bytes = even_block(16);
        let block = Block::new(&bytes).unwrap();
        let mut iter = block.iter();
        iter.seek(b"99999").unwrap();
        assert!(!iter.valid());
        assert!(iter.status().is_none());
    }

    // ----------------------------------------------------------------
    // get
    // ----------------------------------------------------------------

    #[test]
    fn get_hits_and_misses() {
        let bytes = small_block();
        let block = Block::new(&bytes).unwrap();

        assert_eq!(block.get(b"a").unwrap(), Some(&b"1"[..]));
        assert_eq!(block.get(b"abc").unwrap(), Some(&b"3"[..]));
        assert_eq!(block.get(b"b").unwrap(), Some(&b"4"[..]));
        assert_eq!(block.get(b"aa").unwrap(), None);
        assert_eq!(block.get(b"").unwrap(), None);
        assert_eq!(block.get(b"zz").unwrap(), None);
    }

    // ----------------------------------------------------------------
    // Empty and unpositioned cursors
    // ----------------------------------------------------------------

    #[test]
    fn empty_block_seek() {
        let bytes = BlockBuilder::default().finish().unwrap().to_vec();
        let block = Block::new(&bytes).unwrap();
        let mut iter = block.iter();

        iter.seek(b"anything").unwrap();
        assert!(!iter.valid());
        iter.next().unwrap();
        assert!(!iter.valid());
        assert_eq!(block.get(b"").unwrap(), None);
    }

    /// A fresh cursor is not positioned and `next` does not move it.
    #[test]
    fn fresh_cursor_is_not_valid() {
        let bytes = small_block();
        let block = Block::new(&bytes).unwrap();
        let mut iter = block.iter();

        assert!(!iter.valid());
        iter.next().unwrap();
        assert!(!iter.valid());
        assert_eq!(iter.key(), b"");
    }
}
