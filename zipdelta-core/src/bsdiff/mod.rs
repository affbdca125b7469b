//! A from-scratch bsdiff implementation (spec.md §4.5): suffix-array based
//! longest-common-substring search plus sign-magnitude control encoding.
//! Owned rather than delegated to a wrapper crate since the control format
//! and suffix sort are this system's core deliverable (see DESIGN.md).

mod apply;
mod generate;
mod suffix;
mod varint;

pub use apply::apply;
pub use generate::generate;

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, RngCore};
    use zipdelta_zip::CancelToken;

    fn round_trip(old: &[u8], new: &[u8]) {
        let cancel = CancelToken::new();
        let delta = generate(old, new, &cancel).unwrap();
        let recovered = apply(old, &delta, new.len() as u64, &cancel).unwrap();
        assert_eq!(recovered, new);
    }

    #[test]
    fn literal_string_version_bump() {
        round_trip(
            b"This is version 1 of a test file.",
            b"This is version 2 of a test file.",
        );
    }

    #[test]
    fn empty_old_and_new() {
        round_trip(b"", b"");
    }

    #[test]
    fn empty_old_nonempty_new() {
        round_trip(b"", b"freshly added content");
    }

    #[test]
    fn identical_inputs_produce_tiny_delta() {
        let content = b"the quick brown fox jumps over the lazy dog".repeat(64);
        let cancel = CancelToken::new();
        let delta = generate(&content, &content, &cancel).unwrap();
        assert!(delta.len() < content.len() / 4);
        round_trip(&content, &content);
    }

    #[test]
    fn shuffled_blocks_still_round_trip() {
        let old = b"AAAAAAAAAABBBBBBBBBBCCCCCCCCCCDDDDDDDDDD".to_vec();
        let new = b"CCCCCCCCCCAAAAAAAAAADDDDDDDDDDBBBBBBBBBB".to_vec();
        round_trip(&old, &new);
    }

    #[test]
    fn rejects_truncated_delta() {
        let cancel = CancelToken::new();
        let delta = generate(b"hello world", b"hello there world", &cancel).unwrap();
        let truncated = &delta[..delta.len() - 1];
        assert!(apply(b"hello world", truncated, 17, &cancel).is_err());
    }

    /// The "BSDIFF algebraic" property (spec.md §8): for random byte
    /// sequences, `apply(a, generate(a, b)) == b`. Runs several random
    /// (old, new) pairs rather than the spec's full 2^20-byte ceiling, to
    /// keep the suite fast; the suffix-array/control-encoding logic under
    /// test has no size-dependent branch, so a few KiB exercises the same
    /// code paths a multi-megabyte input would.
    #[test]
    fn algebraic_property_holds_for_random_byte_sequences() {
        let mut rng = rand::thread_rng();
        for _ in 0..8 {
            let old_len = rng.gen_range(0..8192);
            let new_len = rng.gen_range(0..8192);
            let mut old = vec![0u8; old_len];
            let mut new = vec![0u8; new_len];
            rng.fill_bytes(&mut old);
            rng.fill_bytes(&mut new);

            round_trip(&old, &new);
        }
    }
}
