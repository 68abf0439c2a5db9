//! Splitting entity sequences into size and count bounded batches
//!
//! An entity is added to the current batch first and the limits are checked
//! afterwards, so a batch is flushed as soon as it *exceeds* the block size.
//! A batch can therefore overshoot the block size by at most one entity; the
//! 800k ceiling keeps that overshoot under the broker's 1MB request limit.

use crate::config::{DEFAULT_BATCH_SIZE, DEFAULT_BLOCK_SIZE};
use crate::error::{EtlError, Result};
use etl_common::json::canonical_len;
use serde::Serialize;

/// Largest block size that may be configured, in bytes.
pub const MAX_BLOCK_SIZE: usize = 800_000;

/// Limits applied when grouping entities into batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    block_size: usize,
    batch_size: usize,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl BatchLimits {
    /// `block_size` in bytes (at most [`MAX_BLOCK_SIZE`]); `batch_size` in
    /// entities, 0 meaning no count limit.
    pub fn new(block_size: usize, batch_size: usize) -> Result<Self> {
        if block_size > MAX_BLOCK_SIZE {
            return Err(EtlError::validation(format!(
                "Block size limit reached! <<block_size>> value cannot be greater than {}",
                MAX_BLOCK_SIZE
            )));
        }
        Ok(Self {
            block_size,
            batch_size,
        })
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Split `entities` into consecutive batches, preserving input order.
    ///
    /// Every batch but the last one has either exceeded the block size or
    /// reached the batch size. Empty input yields no batches.
    pub fn split<'a, T: Serialize>(&self, entities: &'a [T]) -> Result<Vec<&'a [T]>> {
        let mut batches = Vec::new();
        let mut start = 0;
        let mut accumulated = 0usize;

        for (idx, entity) in entities.iter().enumerate() {
            accumulated += canonical_len(entity)?;
            let count = idx + 1 - start;

            if accumulated > self.block_size || (self.batch_size > 0 && count >= self.batch_size) {
                batches.push(&entities[start..=idx]);
                start = idx + 1;
                accumulated = 0;
            }
        }

        if start < entities.len() {
            batches.push(&entities[start..]);
        }

        Ok(batches)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use etl_common::json::to_canonical_string;
    use etl_common::Entity;
    use proptest::prelude::*;

    fn entity(n: usize, payload: &str) -> Entity {
        Entity::new(format!("id_{}", n), "Sensor").with_attribute("payload", "Text", payload)
    }

    #[test]
    fn test_block_size_ceiling() {
        assert!(BatchLimits::new(800_000, 0).is_ok());
        let err = BatchLimits::new(800_001, 0).unwrap_err();
        assert!(matches!(err, EtlError::Validation(_)));
        assert!(err.to_string().contains("cannot be greater than 800000"));
    }

    #[test]
    fn test_empty_input() {
        let limits = BatchLimits::default();
        let batches = limits.split::<Entity>(&[]).unwrap();
        assert!(batches.is_empty());
    }

    #[test]
    fn test_everything_fits_in_one_batch() {
        let entities: Vec<Entity> = (0..10).map(|n| entity(n, "x")).collect();
        let batches = BatchLimits::default().split(&entities).unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 10);
    }

    #[test]
    fn test_count_limit() {
        let entities: Vec<Entity> = (0..7).map(|n| entity(n, "x")).collect();
        let limits = BatchLimits::new(800_000, 3).unwrap();
        let sizes: Vec<usize> = limits.split(&entities).unwrap().iter().map(|b| b.len()).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
    }

    #[test]
    fn test_flush_after_exceeding_block_size() {
        let entities: Vec<Entity> = (0..5).map(|n| entity(n, "0123456789")).collect();
        let one = to_canonical_string(&entities[0]).unwrap().len();

        // exactly two entities do not exceed the block, the third one does
        let limits = BatchLimits::new(one * 2, 0).unwrap();
        let sizes: Vec<usize> = limits.split(&entities).unwrap().iter().map(|b| b.len()).collect();
        assert_eq!(sizes, vec![3, 2]);
    }

    #[test]
    fn test_oversized_entity_goes_alone() {
        let entities = vec![entity(0, &"x".repeat(500)), entity(1, "y"), entity(2, "z")];
        let limits = BatchLimits::new(100, 0).unwrap();
        let sizes: Vec<usize> = limits.split(&entities).unwrap().iter().map(|b| b.len()).collect();
        assert_eq!(sizes, vec![1, 2]);
    }

    proptest! {
        #[test]
        fn prop_split_preserves_order_and_bounds(
            payloads in proptest::collection::vec("[a-z]{0,40}", 0..60),
            block_size in 1usize..400,
            batch_size in 0usize..8,
        ) {
            let entities: Vec<Entity> = payloads
                .iter()
                .enumerate()
                .map(|(n, p)| entity(n, p))
                .collect();
            let limits = BatchLimits::new(block_size, batch_size).unwrap();
            let batches = limits.split(&entities).unwrap();

            let rebuilt: Vec<Entity> = batches.iter().flat_map(|b| b.iter().cloned()).collect();
            prop_assert_eq!(&rebuilt, &entities);

            for (i, batch) in batches.iter().enumerate() {
                prop_assert!(!batch.is_empty());
                if batch_size > 0 {
                    prop_assert!(batch.len() <= batch_size);
                }
                let size: usize = batch.iter().map(|e| canonical_len(e).unwrap()).sum();
                let last = i + 1 == batches.len();
                if !last {
                    prop_assert!(size > block_size || batch.len() == batch_size);
                }
                // overshoot is bounded by the last entity added
                let without_last: usize = size - canonical_len(&batch[batch.len() - 1]).unwrap();
                prop_assert!(without_last <= block_size);
            }
        }
    }
}
