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

use crate::{Error, Metric, Result, Searchable};
use bitset::ObjectId;
use rayon::ThreadPool;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use std::collections::HashSet;
use std::num::NonZero;
use std::sync::Arc;
use topk::BoundedTopK;

/// Exact search by comparing the query with every object.
pub struct LinearIndex<O, M> {
    metric: M,
    pool: Arc<ThreadPool>,
    ids: HashSet<ObjectId>,
    objects: Vec<(ObjectId, O)>,
}

impl<O: Send + Sync, M: Metric<O>> LinearIndex<O, M> {
    pub fn new(metric: M, pool: Arc<ThreadPool>) -> Self {
        Self {
            metric,
            pool,
            ids: HashSet::new(),
            objects: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn insert(&mut self, id: ObjectId, object: O) -> Result<()> {
        if !self.ids.insert(id) {
            return Err(Error::DuplicateObject(id));
        }
        self.objects.push((id, object));
        Ok(())
    }

    /// Distance to every object, in insertion order.
    fn scan(&self, query: &O) -> Result<Vec<(ObjectId, M::Distance)>> {
        self.pool.install(|| {
            self.objects
                .par_iter()
                .map(|(id, object)| {
                    let distance = self.metric.distance(query, object).map_err(Error::callback)?;
                    Ok::<_, Error>((*id, distance))
                })
                .collect()
        })
    }
}

impl<O: Send + Sync, M: Metric<O>> Searchable<O> for LinearIndex<O, M> {
    type Distance = M::Distance;

    /// `max_candidates` is ignored.
    fn search(
        &self,
        query: &O,
        k: usize,
        _max_candidates: usize,
    ) -> Result<Vec<(ObjectId, M::Distance)>> {
        let k = NonZero::new(k).ok_or(Error::Configuration("k must be positive".into()))?;
        let mut results = BoundedTopK::new(k);
        results.extend(self.scan(query)?);
        Ok(results.into_sorted_vec())
    }

    fn range_search(
        &self,
        query: &O,
        radius: M::Distance,
        _max_candidates: usize,
    ) -> Result<Vec<(ObjectId, M::Distance)>> {
        let mut results = self.scan(query)?;
        results.retain(|&(_, d)| d <= radius);
        results.sort_by_key(|&(_, d)| d);
        Ok(results)
    }
}

#[test]
fn test_linear_index() {
    use crate::FnMetric;
    use std::convert::Infallible;
    let metric = FnMetric(|a: &i64, b: &i64| Ok::<_, Infallible>(a.abs_diff(*b)));
    let mut index = LinearIndex::new(metric, crate::build_pool(2).unwrap());
    for id in [5, 1, 1_000_000, 42, 40] {
        index.insert(id, id).unwrap();
    }
    assert!(matches!(index.insert(1, 1), Err(Error::DuplicateObject(1))));
    assert_eq!(index.len(), 5);
    assert_eq!(
        index.search(&41, 3, 0).unwrap(),
        vec![(42, 1), (40, 1), (5, 36)]
    );
    assert_eq!(
        index.range_search(&0, 5, 0).unwrap(),
        vec![(1, 1), (5, 5)]
    );
    assert!(matches!(index.search(&0, 0, 0), Err(Error::Configuration(_))));
}
