//! Pseudo-random index assignment.
//!
//! Indices are drawn from a bounded-lookback entropy source: each draw hashes
//! the entropy found `nonce` blocks back together with the caller and the
//! nonce, and reduces the hash modulo the index range. The nonce wraps before
//! it leaves the source's window.

use crate::core::{derive_key, AccountId, Error, Hash256, Result};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::collections::VecDeque;

/// Source of recent entropy, e.g. recent block hashes.
pub trait EntropySource: Send + Sync {
    /// Entropy `lookback` steps back. Only valid inside the source's window.
    fn recent_entropy(&self, lookback: u32) -> Result<Hash256>;
}

/// Sliding window of recent block hashes.
#[derive(Clone, Debug)]
pub struct BlockWindow {
    blocks: VecDeque<Hash256>,
    window: usize,
}

impl BlockWindow {
    /// Create an empty window holding at most `window` hashes.
    pub fn new(window: usize) -> Self {
        Self {
            blocks: VecDeque::with_capacity(window),
            window,
        }
    }

    /// Create a full window of hashes generated from `seed`.
    pub fn seeded(seed: u64, window: usize) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut blocks = Self::new(window);
        for _ in 0..window {
            let mut bytes = [0u8; 32];
            rng.fill_bytes(&mut bytes);
            blocks.push(Hash256::new(bytes));
        }
        blocks
    }

    /// Append the newest block hash, evicting the oldest when full.
    pub fn push(&mut self, hash: Hash256) {
        if self.blocks.len() == self.window {
            self.blocks.pop_front();
        }
        self.blocks.push_back(hash);
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

impl EntropySource for BlockWindow {
    fn recent_entropy(&self, lookback: u32) -> Result<Hash256> {
        let lookback = lookback as usize;
        if lookback >= self.blocks.len() {
            return Err(Error::EntropyUnavailable(lookback as u32));
        }
        Ok(self.blocks[self.blocks.len() - 1 - lookback])
    }
}

/// Index generator with a wrapping nonce.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexGenerator {
    nonce: u32,
    /// Largest nonce before wrapping to zero
    wrap: u32,
    /// Indices are drawn from `[0, range)`
    range: u8,
}

impl IndexGenerator {
    pub fn new(range: u8, wrap: u32) -> Self {
        Self {
            nonce: 0,
            wrap,
            range,
        }
    }

    pub fn nonce(&self) -> u32 {
        self.nonce
    }

    pub fn range(&self) -> u8 {
        self.range
    }

    /// Draw one index for `account`.
    pub fn next_index<E: EntropySource + ?Sized>(
        &mut self,
        entropy: &E,
        account: &AccountId,
    ) -> Result<u8> {
        let nonce = self.nonce;
        let seed = entropy.recent_entropy(nonce)?;
        let hash = derive_key(&[
            seed.as_bytes(),
            account.as_str().as_bytes(),
            &nonce.to_be_bytes(),
        ]);
        self.nonce = if nonce >= self.wrap { 0 } else { nonce + 1 };
        Ok(hash.reduce(self.range))
    }

    /// Draw `count` pairwise-distinct indices, resampling on collision.
    ///
    /// The nonce only advances if every draw succeeds.
    pub fn distinct_indices<E: EntropySource + ?Sized>(
        &mut self,
        entropy: &E,
        account: &AccountId,
        count: usize,
    ) -> Result<Vec<u8>> {
        if count > self.range as usize {
            return Err(Error::InvalidConfig(format!(
                "cannot draw {} distinct indices from a range of {}",
                count, self.range
            )));
        }

        let mut draft = self.clone();
        let mut indices = Vec::with_capacity(count);
        while indices.len() < count {
            let index = draft.next_index(entropy, account)?;
            if !indices.contains(&index) {
                indices.push(index);
            }
        }

        *self = draft;
        Ok(indices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Same entropy at every lookback; only the nonce varies the draw.
    struct Constant;

    impl EntropySource for Constant {
        fn recent_entropy(&self, _lookback: u32) -> Result<Hash256> {
            Ok(Hash256::new([42u8; 32]))
        }
    }

    #[test]
    fn test_block_window_lookback() {
        let mut window = BlockWindow::new(3);
        for n in 1..=4u8 {
            window.push(Hash256::new([n; 32]));
        }
        assert_eq!(window.len(), 3);
        assert_eq!(window.recent_entropy(0).unwrap(), Hash256::new([4; 32]));
        assert_eq!(window.recent_entropy(2).unwrap(), Hash256::new([2; 32]));
        assert_eq!(window.recent_entropy(3), Err(Error::EntropyUnavailable(3)));
    }

    #[test]
    fn test_seeded_window_is_deterministic() {
        let a = BlockWindow::seeded(7, 256);
        let b = BlockWindow::seeded(7, 256);
        assert_eq!(a.recent_entropy(100).unwrap(), b.recent_entropy(100).unwrap());
        assert_eq!(a.len(), 256);
    }

    #[test]
    fn test_nonce_wraps() {
        let mut generator = IndexGenerator::new(10, 250);
        let account = AccountId::from("reporter");
        for _ in 0..251 {
            generator.next_index(&Constant, &account).unwrap();
        }
        assert_eq!(generator.nonce(), 0);
        generator.next_index(&Constant, &account).unwrap();
        assert_eq!(generator.nonce(), 1);
    }

    #[test]
    fn test_failed_draw_keeps_nonce() {
        let mut generator = IndexGenerator::new(10, 250);
        let empty = BlockWindow::new(256);
        let result = generator.distinct_indices(&empty, &AccountId::from("r"), 3);
        assert_eq!(result, Err(Error::EntropyUnavailable(0)));
        assert_eq!(generator.nonce(), 0);
    }

    #[test]
    fn test_too_many_indices() {
        let mut generator = IndexGenerator::new(2, 250);
        let result = generator.distinct_indices(&Constant, &AccountId::from("r"), 3);
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    proptest! {
        #[test]
        fn prop_three_distinct_indices(seed in any::<u64>(), name in "[a-z]{1,12}", warmup in 0u32..300) {
            let window = BlockWindow::seeded(seed, 256);
            let mut generator = IndexGenerator::new(10, 250);
            let account = AccountId::new(name);
            for _ in 0..warmup {
                generator.next_index(&window, &account).unwrap();
            }

            let indices = generator.distinct_indices(&window, &account, 3).unwrap();
            prop_assert_eq!(indices.len(), 3);
            prop_assert!(indices.iter().all(|i| *i < 10));
            prop_assert!(indices[0] != indices[1] && indices[0] != indices[2] && indices[1] != indices[2]);
        }
    }
}
