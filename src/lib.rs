// This software is licensed under a dual license model:
//
// GNU Affero General Public License v3 (AGPLv3): You may use, modify, and
// distribute this software under the terms of the AGPLv3.
//
// Elastic License v2 (ELv2): You may also use, modify, and distribute this
// software under the Elastic License v2, which has specific restrictions.
//
// We welcome any commercial collaboration or support. For inquiries
// regarding the licenses, please contact us at:
// vectorchord-inquiry@tensorchord.ai
//
// Copyright (c) 2025 TensorChord Inc.

//! Approximate similarity search over any metric space.
//!
//! Objects are projected onto a handful of pivots, filed into buckets by a
//! coarsened projection and stored as compressed identifier sets. A query
//! shortlists candidates by proxy distance and refines them with the real
//! metric on a worker pool.

mod engine;
mod error;
mod linear;
mod metric;
mod options;
mod pivots;
pub mod storage;

pub use bitset::{CompressedBucketSet, GapCode, ObjectId};
pub use distance::{Distance, Scalar};
pub use engine::{Engine, State};
pub use error::{BoxedError, Error, Result};
pub use linear::LinearIndex;
pub use metric::{Euclidean, FnMetric, Levenshtein, Metric, MetricError};
pub use options::IndexOptions;
pub use pivots::{PivotSelector, RandomPivots};
pub use projection::{Policy, Projection};

use std::sync::Arc;

/// A k-nearest-neighbor and range query surface.
pub trait Searchable<O> {
    type Distance: Scalar;

    /// The `k` closest objects among at most `max_candidates` shortlisted
    /// ones, ascending by distance.
    fn search(
        &self,
        query: &O,
        k: usize,
        max_candidates: usize,
    ) -> Result<Vec<(ObjectId, Self::Distance)>>;

    /// Every shortlisted object within `radius`, ascending by distance.
    fn range_search(
        &self,
        query: &O,
        radius: Self::Distance,
        max_candidates: usize,
    ) -> Result<Vec<(ObjectId, Self::Distance)>>;
}

/// Builds a worker pool for distance refinement.
pub fn build_pool(threads: u32) -> Result<Arc<rayon::ThreadPool>> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads as usize)
        .thread_name(|i| format!("bucketsearch-{i}"))
        .build()
        .map_err(|e| Error::Configuration(format!("failed to build thread pool: {e}")))?;
    Ok(Arc::new(pool))
}
