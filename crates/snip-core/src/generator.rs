use crate::short_id::ShortId;
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use typed_builder::TypedBuilder;

/// Trait for generating short identifiers.
///
/// Implementations are pure generators that don't interact with storage.
/// Stores call [`Generator::generate`] again whenever a candidate is already
/// taken, so a generator only has to be collision-unlikely, not collision-free.
pub trait Generator: Send + Sync + 'static {
    fn generate(&self) -> ShortId;
}

pub const ALPHANUMERIC: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Draws fixed-length identifiers uniformly from an alphabet.
#[derive(Debug, Clone, TypedBuilder)]
pub struct RandomGenerator {
    #[builder(default = 8)]
    length: usize,
    #[builder(default = ALPHANUMERIC)]
    alphabet: &'static [u8],
}

impl RandomGenerator {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn length(&self) -> usize {
        self.length
    }
}

impl Default for RandomGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl Generator for RandomGenerator {
    fn generate(&self) -> ShortId {
        let mut rng = rand::thread_rng();
        let id: String = (0..self.length)
            .map(|_| self.alphabet[rng.gen_range(0..self.alphabet.len())] as char)
            .collect();
        ShortId::new_unchecked(id)
    }
}

/// A deterministic generator producing `prefix000000`, `prefix000001`, ...
///
/// Useful in tests and for single-node deployments where sequential codes
/// are acceptable.
#[derive(Debug)]
pub struct SeqGenerator {
    counter: AtomicU64,
    prefix: String,
}

impl SeqGenerator {
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self::with_offset(prefix, 0)
    }

    /// Starts counting from `offset`, e.g. to resume from a known state.
    pub fn with_offset(prefix: impl Into<String>, offset: u64) -> Self {
        Self {
            counter: AtomicU64::new(offset),
            prefix: prefix.into(),
        }
    }
}

impl Clone for SeqGenerator {
    fn clone(&self) -> Self {
        Self {
            counter: AtomicU64::new(self.counter.load(Ordering::SeqCst)),
            prefix: self.prefix.clone(),
        }
    }
}

impl Generator for SeqGenerator {
    fn generate(&self) -> ShortId {
        let count = self.counter.fetch_add(1, Ordering::SeqCst);
        ShortId::new_unchecked(format!("{}{:06}", self.prefix, count))
    }
}

impl<G: Generator> Generator for std::sync::Arc<G> {
    fn generate(&self) -> ShortId {
        G::generate(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn random_generator_respects_length_and_alphabet() {
        let generator = RandomGenerator::builder().length(12).build();
        for _ in 0..100 {
            let id = generator.generate();
            assert_eq!(id.as_str().len(), 12);
            assert!(id.as_str().bytes().all(|b| ALPHANUMERIC.contains(&b)));
        }
    }

    #[test]
    fn random_generator_rarely_repeats() {
        let generator = RandomGenerator::new();
        let ids: HashSet<_> = (0..1000).map(|_| generator.generate()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn random_ids_are_valid_short_ids() {
        let id = RandomGenerator::new().generate();
        assert!(ShortId::new(id.as_str()).is_ok());
    }

    #[test]
    fn seq_generator_produces_sequential_codes() {
        let generator = SeqGenerator::with_prefix("sn");
        assert_eq!(generator.generate().as_str(), "sn000000");
        assert_eq!(generator.generate().as_str(), "sn000001");
        assert_eq!(generator.generate().as_str(), "sn000002");
    }

    #[test]
    fn seq_generator_with_offset() {
        let generator = SeqGenerator::with_offset("sn", 1000);
        assert_eq!(generator.generate().as_str(), "sn001000");
    }

    #[test]
    fn clone_preserves_counter_state() {
        let generator = SeqGenerator::with_prefix("sn");
        generator.generate();
        let cloned = generator.clone();
        assert_eq!(generator.generate().as_str(), "sn000001");
        assert_eq!(cloned.generate().as_str(), "sn000001");
    }

    #[test]
    fn generator_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RandomGenerator>();
        assert_send_sync::<SeqGenerator>();
    }
}
