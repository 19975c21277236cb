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

use crate::storage::{Cursor, Store};
use crate::{Error, IndexOptions, Metric, Result, Searchable, build_pool};
use bitset::{CompressedBucketSet, Encodable, ObjectId};
use log::{debug, info, warn};
use projection::{Projection, Projector, ProxyComparable};
use rayon::ThreadPool;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use std::collections::btree_map::{BTreeMap, Entry};
use std::collections::HashMap;
use std::num::NonZero;
use std::sync::Arc;
use topk::BoundedTopK;

const META_KEY: &[u8] = b"meta";
const BUCKET_PREFIX: &[u8] = b"b/";
const PROJECTION_PREFIX: &[u8] = b"p/";

/// Lifecycle of an [`Engine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Accepting inserts.
    Open,
    /// Read-only and searchable.
    Frozen,
    /// A freeze failed; nothing is allowed anymore.
    Broken,
}

/// An approximate index answering k-nearest-neighbor and range queries.
///
/// Objects are inserted while the engine is open, then `freeze` encodes
/// every bucket and the engine becomes searchable. Searches take `&self`
/// and may run concurrently.
pub struct Engine<O, M> {
    options: IndexOptions,
    projector: Projector,
    pivots: Vec<O>,
    metric: M,
    pool: Arc<ThreadPool>,
    state: State,
    objects: HashMap<ObjectId, O>,
    projections: HashMap<ObjectId, Projection>,
    buckets: BTreeMap<Projection, CompressedBucketSet>,
}

impl<O: Send + Sync, M: Metric<O>> Engine<O, M> {
    pub fn new(options: IndexOptions, pivots: Vec<O>, metric: M) -> Result<Self> {
        options.check()?;
        let pool = build_pool(options.threads)?;
        Self::with_pool(options, pivots, metric, pool)
    }

    /// Like [`Self::new`], but refines on a pool shared with others.
    pub fn with_pool(
        options: IndexOptions,
        pivots: Vec<O>,
        metric: M,
        pool: Arc<ThreadPool>,
    ) -> Result<Self> {
        options.check()?;
        let projector = Projector::new(options.projection)?;
        if pivots.len() != projector.pivots() {
            return Err(Error::Configuration(format!(
                "projection needs {} pivots, got {}",
                projector.pivots(),
                pivots.len()
            )));
        }
        Ok(Self {
            options,
            projector,
            pivots,
            metric,
            pool,
            state: State::Open,
            objects: HashMap::new(),
            projections: HashMap::new(),
            buckets: BTreeMap::new(),
        })
    }

    pub fn options(&self) -> &IndexOptions {
        &self.options
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn pivots(&self) -> &[O] {
        &self.pivots
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Total size of the bucket images.
    pub fn encoded_bytes(&self) -> usize {
        self.buckets.values().map(CompressedBucketSet::encoded_bytes).sum()
    }

    pub fn buckets(&self) -> impl Iterator<Item = (&Projection, &CompressedBucketSet)> {
        self.buckets.iter()
    }

    pub fn projection(&self, id: ObjectId) -> Option<&Projection> {
        self.projections.get(&id)
    }

    fn project(&self, object: &O) -> Result<Projection> {
        self.projector
            .project(object, &self.pivots, |a, b| self.metric.distance(a, b))
            .map_err(Error::callback)
    }

    fn check_state(&self, expected: State) -> Result<()> {
        match (self.state, expected) {
            (a, b) if a == b => Ok(()),
            (State::Broken, _) => Err(Error::InvalidState("index is broken".into())),
            (State::Frozen, _) => Err(Error::InvalidState("index is frozen".into())),
            (State::Open, _) => Err(Error::InvalidState("index is not frozen".into())),
        }
    }

    pub fn insert(&mut self, id: ObjectId, object: O) -> Result<()> {
        self.check_state(State::Open)?;
        if self.objects.contains_key(&id) {
            return Err(Error::DuplicateObject(id));
        }
        let projection = self.project(&object)?;
        let key = projection.coarsen(self.options.bucket_level);
        let bucket = match self.buckets.entry(key) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => e.insert(CompressedBucketSet::new(self.options.gap_code)?),
        };
        bucket.add(id)?;
        self.projections.insert(id, projection);
        self.objects.insert(id, object);
        Ok(())
    }

    /// Encodes every bucket. A failure leaves the engine broken.
    pub fn freeze(&mut self) -> Result<()> {
        self.check_state(State::Open)?;
        for bucket in self.buckets.values_mut() {
            if let Err(e) = bucket.commit() {
                self.state = State::Broken;
                return Err(e.into());
            }
        }
        self.state = State::Frozen;
        info!(
            "froze {} objects into {} buckets, {} bytes",
            self.objects.len(),
            self.buckets.len(),
            self.encoded_bytes()
        );
        Ok(())
    }

    /// Candidates ascending by proxy distance.
    fn shortlist(&self, query: &O, max_candidates: NonZero<usize>) -> Result<Vec<ObjectId>> {
        let projection = self.project(query)?;
        let key = projection.coarsen(self.options.bucket_level);
        let mut probes = self
            .buckets
            .iter()
            .map(|(k, bucket)| (key.proxy_distance(k), bucket))
            .collect::<Vec<_>>();
        probes.sort_by_key(|&(d, _)| d);
        let scan_limit = max_candidates
            .get()
            .saturating_mul(self.options.overscan as usize);
        let mut results = BoundedTopK::new(max_candidates);
        let mut scanned = 0_usize;
        let mut probed = 0_usize;
        for (_, bucket) in probes {
            if scanned >= scan_limit {
                break;
            }
            results.extend(bucket.search_bounded(&projection, max_candidates, |q, id| {
                q.proxy_distance(&self.projections[&id])
            })?);
            scanned += bucket.len();
            probed += 1;
        }
        let shortlist = results.into_sorted_vec();
        debug!(
            "probed {probed} of {} buckets, scanned {scanned} ids, shortlisted {}",
            self.buckets.len(),
            shortlist.len()
        );
        Ok(shortlist.into_iter().map(|(id, _)| id).collect())
    }

    /// Real distances of the shortlist, in shortlist order.
    fn refine(&self, query: &O, shortlist: &[ObjectId]) -> Result<Vec<M::Distance>> {
        self.pool.install(|| {
            shortlist
                .par_iter()
                .map(|id| {
                    let object = self.objects.get(id).ok_or(Error::UnknownObject(*id))?;
                    self.metric.distance(query, object).map_err(Error::callback)
                })
                .collect::<Result<Vec<_>>>()
        })
    }

    fn candidates(
        &self,
        query: &O,
        max_candidates: NonZero<usize>,
    ) -> Result<Vec<(ObjectId, M::Distance)>> {
        let shortlist = self.shortlist(query, max_candidates)?;
        let distances = self.refine(query, &shortlist)?;
        Ok(shortlist.into_iter().zip(distances).collect())
    }

    pub fn search(
        &self,
        query: &O,
        k: usize,
        max_candidates: usize,
    ) -> Result<Vec<(ObjectId, M::Distance)>> {
        self.check_state(State::Frozen)?;
        let k = NonZero::new(k).ok_or(Error::Configuration("k must be positive".into()))?;
        if max_candidates < k.get() {
            return Err(Error::Configuration(format!(
                "max_candidates {max_candidates} is less than k {k}"
            )));
        }
        if self.objects.is_empty() {
            warn!("search on an empty index");
            return Ok(Vec::new());
        }
        let max_candidates = NonZero::new(max_candidates).expect("checked above");
        let mut results = BoundedTopK::new(k);
        results.extend(self.candidates(query, max_candidates)?);
        Ok(results.into_sorted_vec())
    }

    pub fn range_search(
        &self,
        query: &O,
        radius: M::Distance,
        max_candidates: usize,
    ) -> Result<Vec<(ObjectId, M::Distance)>> {
        self.check_state(State::Frozen)?;
        let max_candidates = NonZero::new(max_candidates)
            .ok_or(Error::Configuration("max_candidates must be positive".into()))?;
        if self.objects.is_empty() {
            warn!("range search on an empty index");
            return Ok(Vec::new());
        }
        let mut results = self
            .candidates(query, max_candidates)?
            .into_iter()
            .filter(|&(_, d)| d <= radius)
            .collect::<Vec<_>>();
        results.sort_by_key(|&(_, d)| d);
        Ok(results)
    }

    /// Writes the frozen index to `store`.
    pub fn persist(&self, store: &impl Store) -> Result<()> {
        self.check_state(State::Frozen)?;
        let meta = serde_json::to_vec(&self.options).map_err(|e| Error::Storage(e.into()))?;
        store.put(META_KEY, &meta).map_err(Error::Storage)?;
        for (key, bucket) in self.buckets.iter() {
            let key = [BUCKET_PREFIX, key.to_bytes()?.as_slice()].concat();
            store.put(&key, &bucket.to_bytes()?).map_err(Error::Storage)?;
        }
        for (&id, projection) in self.projections.iter() {
            let key = [PROJECTION_PREFIX, id_to_key(id).as_slice()].concat();
            store
                .put(&key, &projection.to_bytes()?)
                .map_err(Error::Storage)?;
        }
        info!(
            "persisted {} buckets and {} projections",
            self.buckets.len(),
            self.projections.len()
        );
        Ok(())
    }

    /// Rebuilds a frozen engine written by [`Self::persist`].
    ///
    /// The projection, bucket level and gap code must match the persisted
    /// ones. `objects` must hold every indexed object; others are ignored.
    pub fn restore(
        options: IndexOptions,
        pivots: Vec<O>,
        metric: M,
        mut objects: HashMap<ObjectId, O>,
        store: &impl Store,
    ) -> Result<Self> {
        let mut engine = Self::new(options, pivots, metric)?;
        let meta = store
            .get(META_KEY)
            .map_err(Error::Storage)?
            .ok_or(Error::Configuration("no index in store".into()))?;
        let persisted: IndexOptions = serde_json::from_slice(&meta)
            .map_err(|e| Error::Corrupted(format!("index metadata: {e}")))?;
        let options = &engine.options;
        if (persisted.projection, persisted.bucket_level, persisted.gap_code)
            != (options.projection, options.bucket_level, options.gap_code)
        {
            return Err(Error::Configuration(format!(
                "layout differs from the persisted index: {persisted:?}"
            )));
        }
        let (policy, level, code) = (
            engine.options.projection,
            engine.options.bucket_level,
            engine.options.gap_code,
        );
        let mut cursor = store
            .range_scan(BUCKET_PREFIX, &prefix_end(BUCKET_PREFIX))
            .map_err(Error::Storage)?;
        for entry in cursor.by_ref() {
            let (key, value) = entry.map_err(Error::Storage)?;
            let key = Projection::decode((), &key[BUCKET_PREFIX.len()..])?;
            if !policy.matches(&key, level) {
                return Err(Error::Corrupted("bucket key of another projection".into()));
            }
            let bucket = CompressedBucketSet::decode(code, &value)?;
            if bucket.is_empty() {
                return Err(Error::Corrupted("empty bucket".into()));
            }
            engine.buckets.insert(key, bucket);
        }
        cursor.release();
        let mut cursor = store
            .range_scan(PROJECTION_PREFIX, &prefix_end(PROJECTION_PREFIX))
            .map_err(Error::Storage)?;
        for entry in cursor.by_ref() {
            let (key, value) = entry.map_err(Error::Storage)?;
            let id = key_to_id(&key[PROJECTION_PREFIX.len()..])?;
            let projection = Projection::decode((), &value)?;
            if !policy.matches(&projection, policy.max_level()) {
                return Err(Error::Corrupted(format!(
                    "projection of object {id} from another policy"
                )));
            }
            engine.projections.insert(id, projection);
        }
        cursor.release();
        for (key, bucket) in engine.buckets.iter() {
            for id in bucket.iter()? {
                let projection = engine
                    .projections
                    .get(&id)
                    .ok_or_else(|| Error::Corrupted(format!("no projection for object {id}")))?;
                if projection.coarsen(level) != *key {
                    return Err(Error::Corrupted(format!("object {id} in a wrong bucket")));
                }
                let object = objects.remove(&id).ok_or(Error::UnknownObject(id))?;
                engine.objects.insert(id, object);
            }
        }
        if engine.objects.len() != engine.projections.len() {
            return Err(Error::Corrupted("projections of unindexed objects".into()));
        }
        engine.state = State::Frozen;
        info!(
            "restored {} objects in {} buckets",
            engine.objects.len(),
            engine.buckets.len()
        );
        Ok(engine)
    }
}

impl<O: Send + Sync, M: Metric<O>> Searchable<O> for Engine<O, M> {
    type Distance = M::Distance;

    fn search(
        &self,
        query: &O,
        k: usize,
        max_candidates: usize,
    ) -> Result<Vec<(ObjectId, M::Distance)>> {
        Engine::search(self, query, k, max_candidates)
    }

    fn range_search(
        &self,
        query: &O,
        radius: M::Distance,
        max_candidates: usize,
    ) -> Result<Vec<(ObjectId, M::Distance)>> {
        Engine::range_search(self, query, radius, max_candidates)
    }
}

// big endian with the sign bit flipped sorts like the integers
fn id_to_key(id: ObjectId) -> [u8; 8] {
    ((id as u64) ^ (1 << 63)).to_be_bytes()
}

fn key_to_id(key: &[u8]) -> Result<ObjectId> {
    let bytes: [u8; 8] = key
        .try_into()
        .map_err(|_| Error::Corrupted("malformed object key".into()))?;
    Ok((u64::from_be_bytes(bytes) ^ (1 << 63)) as ObjectId)
}

// the least key greater than every key starting with `prefix`
fn prefix_end(prefix: &[u8]) -> Vec<u8> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last != u8::MAX {
            end.push(last + 1);
            return end;
        }
    }
    end
}

#[cfg(test)]
fn l1(a: &[i32; 2], b: &[i32; 2]) -> Result<u32, std::convert::Infallible> {
    Ok(a[0].abs_diff(b[0]) + a[1].abs_diff(b[1]))
}

#[cfg(test)]
fn points(rng: &mut impl rand::Rng, n: usize) -> Vec<[i32; 2]> {
    (0..n)
        .map(|_| [rng.random_range(-1000..1000), rng.random_range(-1000..1000)])
        .collect()
}

#[cfg(test)]
fn build(
    options: IndexOptions,
    objects: &[[i32; 2]],
    seed: u64,
) -> Engine<[i32; 2], impl Metric<[i32; 2], Distance = u32>> {
    use crate::{FnMetric, PivotSelector, RandomPivots};
    let count = options.projection.pivots();
    let pivots = RandomPivots::new(seed).select(objects, count).unwrap();
    let mut engine = Engine::new(options, pivots, FnMetric(l1)).unwrap();
    for (id, object) in objects.iter().enumerate() {
        engine.insert(id as ObjectId, *object).unwrap();
    }
    engine.freeze().unwrap();
    engine
}

#[cfg(test)]
fn exact(
    objects: &[[i32; 2]],
) -> crate::LinearIndex<[i32; 2], impl Metric<[i32; 2], Distance = u32>> {
    let mut index = crate::LinearIndex::new(crate::FnMetric(l1), build_pool(2).unwrap());
    for (id, object) in objects.iter().enumerate() {
        index.insert(id as ObjectId, *object).unwrap();
    }
    index
}

#[cfg(test)]
fn line_engine(
    options: IndexOptions,
    pivots: Vec<i64>,
) -> Engine<i64, impl Metric<i64, Distance = u64>> {
    let metric = crate::FnMetric(|a: &i64, b: &i64| {
        if *a == -1 || (*a == 500 && *b == 13) {
            Err(std::io::Error::other("unreachable object"))
        } else {
            Ok(a.abs_diff(*b))
        }
    });
    Engine::new(options, pivots, metric).unwrap()
}

#[test]
fn test_scenario() {
    let options = IndexOptions {
        projection: projection::Policy::Permutation {
            pivots: 5,
            prefix: 5,
        },
        ..Default::default()
    };
    let mut engine = line_engine(options, vec![0, 10, 50, 100, 2_000_000]);
    for id in [5, 1, 1_000_000, 42] {
        engine.insert(id, id).unwrap();
    }
    assert!(matches!(engine.insert(1, 1), Err(Error::DuplicateObject(1))));
    assert_eq!(engine.len(), 4);
    engine.freeze().unwrap();
    assert_eq!(engine.state(), State::Frozen);
    assert_eq!(engine.bucket_count(), 1);
    let (_, bucket) = engine.buckets().next().unwrap();
    assert_eq!(bucket.decode_all().unwrap(), vec![1, 5, 42, 1_000_000]);
    // proxies to 42 are 4, 4, 0, 6 for 1, 5, 42, 1000000
    assert_eq!(engine.search(&42, 2, 3).unwrap(), vec![(42, 0), (5, 37)]);
    assert_eq!(
        engine.search(&42, 4, 4).unwrap(),
        vec![(42, 0), (5, 37), (1, 41), (1_000_000, 999_958)]
    );
    assert_eq!(engine.search(&42, 1, 1).unwrap(), vec![(42, 0)]);
    assert_eq!(
        engine.range_search(&42, 40, 4).unwrap(),
        vec![(42, 0), (5, 37)]
    );
}

#[test]
fn test_lifecycle() {
    let options = IndexOptions {
        projection: projection::Policy::Sketch { bits: 1 },
        ..Default::default()
    };
    let mut engine = line_engine(options.clone(), vec![0, 100]);
    engine.insert(7, 7).unwrap();
    assert!(matches!(engine.search(&7, 1, 1), Err(Error::InvalidState(_))));
    assert!(matches!(
        engine.range_search(&7, 1, 1),
        Err(Error::InvalidState(_))
    ));
    assert!(matches!(
        engine.persist(&crate::storage::MemoryStore::new()),
        Err(Error::InvalidState(_))
    ));
    engine.freeze().unwrap();
    assert!(matches!(engine.insert(8, 8), Err(Error::InvalidState(_))));
    assert!(matches!(engine.freeze(), Err(Error::InvalidState(_))));
    assert_eq!(engine.search(&7, 1, 1).unwrap(), vec![(7, 0)]);

    let mut empty = line_engine(options, vec![0, 100]);
    empty.freeze().unwrap();
    assert!(empty.is_empty());
    assert_eq!(empty.bucket_count(), 0);
    assert_eq!(empty.search(&7, 1, 1).unwrap(), vec![]);
    assert_eq!(empty.range_search(&7, 100, 1).unwrap(), vec![]);
}

#[test]
fn test_arguments() {
    let options = IndexOptions {
        projection: projection::Policy::Sketch { bits: 1 },
        ..Default::default()
    };
    let metric =
        crate::FnMetric(|a: &i64, b: &i64| Ok::<_, std::convert::Infallible>(a.abs_diff(*b)));
    assert!(matches!(
        Engine::new(options.clone(), vec![0i64], metric),
        Err(Error::Configuration(_))
    ));
    let invalid = IndexOptions {
        threads: 0,
        ..options.clone()
    };
    assert!(matches!(
        Engine::new(invalid, vec![0, 1], metric),
        Err(Error::Configuration(_))
    ));
    let mut engine = Engine::new(options, vec![0, 100], metric).unwrap();
    engine.insert(1, 1).unwrap();
    engine.freeze().unwrap();
    assert!(matches!(engine.search(&1, 0, 1), Err(Error::Configuration(_))));
    assert!(matches!(engine.search(&1, 2, 1), Err(Error::Configuration(_))));
    assert!(matches!(
        engine.range_search(&1, 1, 0),
        Err(Error::Configuration(_))
    ));
}

#[test]
fn test_callback_errors() {
    let options = IndexOptions {
        projection: projection::Policy::Permutation {
            pivots: 2,
            prefix: 1,
        },
        ..Default::default()
    };
    let mut engine = line_engine(options, vec![0, 100]);
    for id in 0..50 {
        engine.insert(id, id).unwrap();
    }
    assert!(matches!(
        engine.insert(99, -1),
        Err(Error::DistanceCallback(_))
    ));
    assert_eq!(engine.len(), 50);
    assert!(engine.projection(99).is_none());
    engine.freeze().unwrap();
    assert!(matches!(
        engine.search(&500, 1, 50),
        Err(Error::DistanceCallback(_))
    ));
    assert!(matches!(
        engine.range_search(&500, 1000, 50),
        Err(Error::DistanceCallback(_))
    ));
    assert!(matches!(
        engine.search(&-1, 1, 50),
        Err(Error::DistanceCallback(_))
    ));
    assert_eq!(engine.search(&501, 1, 50).unwrap(), vec![(49, 452)]);
}

#[test]
fn test_freeze_failure() {
    let options = IndexOptions {
        projection: projection::Policy::Sketch { bits: 1 },
        gap_code: bitset::GapCode::Fixed(4),
        ..Default::default()
    };
    let mut engine = line_engine(options, vec![0, 1_000]);
    engine.insert(0, 0).unwrap();
    engine.insert(100, 100).unwrap();
    assert!(matches!(
        engine.freeze(),
        Err(Error::EncodingOverflow {
            value: 100,
            width: 4
        })
    ));
    assert_eq!(engine.state(), State::Broken);
    assert!(matches!(engine.freeze(), Err(Error::InvalidState(_))));
    assert!(matches!(engine.insert(1, 1), Err(Error::InvalidState(_))));
    assert!(matches!(engine.search(&0, 1, 1), Err(Error::InvalidState(_))));
}

#[test]
fn test_matches_linear_scan() {
    use crate::Searchable;
    use projection::Policy;
    use rand::SeedableRng;
    let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(3);
    let objects = points(&mut rng, 2000);
    let queries = points(&mut rng, 20);
    let linear = exact(&objects);
    for (projection, bucket_level) in [
        (
            Policy::Permutation {
                pivots: 16,
                prefix: 4,
            },
            0,
        ),
        (
            Policy::Permutation {
                pivots: 16,
                prefix: 4,
            },
            2,
        ),
        (Policy::Sketch { bits: 8 }, 3),
    ] {
        let options = IndexOptions {
            projection,
            bucket_level,
            overscan: 1,
            ..Default::default()
        };
        let engine = build(options, &objects, 5);
        assert_eq!(engine.len(), objects.len());
        if bucket_level > 0 {
            assert!(engine.bucket_count() > 1);
        }
        let n = objects.len();
        for query in queries.iter() {
            let distances =
                |r: Vec<(ObjectId, u32)>| r.into_iter().map(|(_, d)| d).collect::<Vec<_>>();
            assert_eq!(
                distances(engine.search(query, 10, n).unwrap()),
                distances(linear.search(query, 10, n).unwrap())
            );
            let mut a = Searchable::range_search(&engine, query, 150, n).unwrap();
            let mut b = linear.range_search(query, 150, n).unwrap();
            assert!(a.is_sorted_by_key(|&(_, d)| d));
            a.sort();
            b.sort();
            assert_eq!(a, b);
        }
    }
}

#[test]
fn test_recall() {
    use crate::Searchable;
    use rand::SeedableRng;
    use std::collections::HashSet;
    let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(17);
    let objects = points(&mut rng, 5000);
    let queries = points(&mut rng, 20);
    let linear = exact(&objects);
    let engine = build(IndexOptions::default(), &objects, 9);
    let (k, max_candidates) = (10, 500);
    let mut hits = 0;
    for query in queries.iter() {
        let result = engine.search(query, k, max_candidates).unwrap();
        assert_eq!(result.len(), k);
        assert!(result.is_sorted_by_key(|&(_, d)| d));
        // a far object wins only by a tie
        let truth = linear.search(query, k, k).unwrap();
        let bound = truth[k - 1].1;
        let truth = truth.into_iter().map(|(id, _)| id).collect::<HashSet<_>>();
        hits += result
            .iter()
            .filter(|&&(id, d)| truth.contains(&id) || d == bound)
            .count();
    }
    let recall = hits as f64 / (k * queries.len()) as f64;
    assert!(recall >= 0.7, "recall {recall}");
}

#[test]
fn test_persist_and_restore() {
    use crate::FnMetric;
    use crate::storage::MemoryStore;
    use projection::Policy;
    use rand::SeedableRng;
    let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(23);
    let objects = points(&mut rng, 1000);
    let queries = points(&mut rng, 10);
    let options = IndexOptions {
        projection: Policy::Permutation {
            pivots: 12,
            prefix: 4,
        },
        bucket_level: 2,
        gap_code: bitset::GapCode::Gamma,
        ..Default::default()
    };
    let engine = build(options.clone(), &objects, 31);
    let store = MemoryStore::new();
    engine.persist(&store).unwrap();
    assert_eq!(store.len(), 1 + engine.bucket_count() + objects.len());
    let map = || {
        objects
            .iter()
            .enumerate()
            .map(|(id, o)| (id as ObjectId, *o))
            .collect::<HashMap<_, _>>()
    };
    let pivots = engine.pivots().to_vec();

    let restored = Engine::restore(
        IndexOptions {
            threads: 1,
            ..options.clone()
        },
        pivots.clone(),
        FnMetric(l1),
        map(),
        &store,
    )
    .unwrap();
    assert_eq!(restored.state(), State::Frozen);
    assert_eq!(restored.len(), engine.len());
    assert_eq!(restored.bucket_count(), engine.bucket_count());
    assert_eq!(restored.encoded_bytes(), engine.encoded_bytes());
    for query in queries.iter() {
        assert_eq!(
            restored.search(query, 5, 100).unwrap(),
            engine.search(query, 5, 100).unwrap()
        );
    }

    let other = IndexOptions {
        gap_code: bitset::GapCode::Delta,
        ..options.clone()
    };
    assert!(matches!(
        Engine::restore(other, pivots.clone(), FnMetric(l1), map(), &store),
        Err(Error::Configuration(_))
    ));
    let mut missing = map();
    missing.remove(&7);
    assert!(matches!(
        Engine::restore(options.clone(), pivots.clone(), FnMetric(l1), missing, &store),
        Err(Error::UnknownObject(7))
    ));
    assert!(matches!(
        Engine::restore(
            options.clone(),
            pivots.clone(),
            FnMetric(l1),
            map(),
            &MemoryStore::new()
        ),
        Err(Error::Configuration(_))
    ));

    let (key, value) = store
        .range_scan(BUCKET_PREFIX, &prefix_end(BUCKET_PREFIX))
        .unwrap()
        .next()
        .unwrap()
        .unwrap();
    store.put(&key, &value[..value.len() - 1]).unwrap();
    assert!(matches!(
        Engine::restore(options, pivots, FnMetric(l1), map(), &store),
        Err(Error::Corrupted(_))
    ));
}

#[test]
fn test_concurrent_searches() {
    use rand::SeedableRng;
    let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(29);
    let objects = points(&mut rng, 3000);
    let queries = points(&mut rng, 32);
    let engine = build(IndexOptions::default(), &objects, 1);
    let expected = queries
        .iter()
        .map(|q| engine.search(q, 10, 200).unwrap())
        .collect::<Vec<_>>();
    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for (query, expected) in queries.iter().zip(expected.iter()) {
                    assert_eq!(&engine.search(query, 10, 200).unwrap(), expected);
                }
            });
        }
    });
}

#[test]
fn test_shared_pool() {
    use crate::FnMetric;
    use projection::Policy;
    let pool = build_pool(2).unwrap();
    let options = IndexOptions {
        projection: Policy::Sketch { bits: 1 },
        ..Default::default()
    };
    let pivots = vec![[0, 0], [9, 9]];
    let mut a =
        Engine::with_pool(options.clone(), pivots.clone(), FnMetric(l1), pool.clone()).unwrap();
    let mut b = Engine::with_pool(options, pivots, FnMetric(l1), pool.clone()).unwrap();
    a.insert(1, [1, 1]).unwrap();
    b.insert(2, [8, 8]).unwrap();
    a.freeze().unwrap();
    b.freeze().unwrap();
    assert_eq!(a.search(&[0, 0], 1, 1).unwrap(), vec![(1, 2)]);
    assert_eq!(b.search(&[0, 0], 1, 1).unwrap(), vec![(2, 16)]);
    assert_eq!(Arc::strong_count(&pool), 3);
}

#[test]
fn test_strings() {
    use crate::{Levenshtein, PivotSelector, RandomPivots};
    use projection::Policy;
    let words = [
        "apple", "apply", "ample", "maple", "grape", "grasp", "graph", "giraffe", "banana",
        "bandana", "cabana", "canal", "candle", "handle", "hand", "land", "lend", "blend",
    ]
    .map(String::from);
    let options = IndexOptions {
        projection: Policy::Sketch { bits: 3 },
        bucket_level: 2,
        ..Default::default()
    };
    let pivots = RandomPivots::new(0).select(&words, 6).unwrap();
    let mut engine = Engine::new(options, pivots, Levenshtein).unwrap();
    for (id, word) in words.iter().enumerate() {
        engine.insert(id as ObjectId, word.clone()).unwrap();
    }
    engine.freeze().unwrap();
    for (id, word) in words.iter().enumerate() {
        let result = engine.search(word, 1, words.len()).unwrap();
        assert_eq!(result, vec![(id as ObjectId, 0)]);
    }
    let result = engine.range_search(&"bland".into(), 1, words.len()).unwrap();
    let mut found = result
        .iter()
        .map(|&(id, _)| words[id as usize].as_str())
        .collect::<Vec<_>>();
    found.sort();
    assert_eq!(found, vec!["blend", "land"]);
}

#[test]
fn test_object_keys() {
    let ids = [i64::MIN, -300, -1, 0, 1, 255, 256, i64::MAX];
    let keys = ids.map(id_to_key);
    assert!(keys.is_sorted());
    for (id, key) in ids.iter().zip(keys.iter()) {
        assert_eq!(key_to_id(key).unwrap(), *id);
    }
    assert!(matches!(key_to_id(&[0; 7]), Err(Error::Corrupted(_))));
    assert_eq!(prefix_end(b"b/"), b"b0".to_vec());
    assert_eq!(prefix_end(&[1, 255]), vec![2]);
}

#[test]
fn test_restore_rejects_foreign_layouts() {
    use crate::FnMetric;
    use crate::storage::MemoryStore;
    use projection::{Permutation, Policy, Sketch};
    use rand::SeedableRng;
    let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(37);
    let objects = points(&mut rng, 200);
    let options = IndexOptions {
        projection: Policy::Permutation {
            pivots: 4,
            prefix: 2,
        },
        bucket_level: 1,
        ..Default::default()
    };
    let engine = build(options.clone(), &objects, 41);
    let map = objects
        .iter()
        .enumerate()
        .map(|(id, o)| (id as ObjectId, *o))
        .collect::<HashMap<_, _>>();
    let sketch = Projection::Sketch(Sketch::from_pairs(&[1u32, 2]));
    let narrow = Projection::Permutation(Permutation::from_distances(&[3u32, 1, 2], 1));
    let flat = Projection::Permutation(Permutation::from_distances(&[4u32, 3, 2, 1], 2).coarsen(0));
    let empty = CompressedBucketSet::decode(bitset::GapCode::Delta, &[0; 12]).unwrap();
    let mut single = CompressedBucketSet::new(bitset::GapCode::Delta).unwrap();
    single.add(0).unwrap();
    single.commit().unwrap();
    let bucket = |key: &Projection| [BUCKET_PREFIX, key.to_bytes().unwrap().as_slice()].concat();
    let cases = [
        (bucket(&sketch), empty.to_bytes().unwrap()),
        (bucket(&sketch), single.to_bytes().unwrap()),
        (bucket(&narrow), single.to_bytes().unwrap()),
        (bucket(&flat), single.to_bytes().unwrap()),
        (
            bucket(&Projection::Permutation(Permutation::from_distances(
                &[9u32, 1, 5, 7],
                1,
            ))),
            empty.to_bytes().unwrap(),
        ),
        (
            [PROJECTION_PREFIX, id_to_key(0).as_slice()].concat(),
            sketch.to_bytes().unwrap(),
        ),
        (
            [PROJECTION_PREFIX, id_to_key(0).as_slice()].concat(),
            narrow.to_bytes().unwrap(),
        ),
    ];
    for (key, value) in cases {
        let store = MemoryStore::new();
        engine.persist(&store).unwrap();
        store.put(&key, &value).unwrap();
        let restored = Engine::restore(
            options.clone(),
            engine.pivots().to_vec(),
            FnMetric(l1),
            map.clone(),
            &store,
        );
        assert!(matches!(restored, Err(Error::Corrupted(_))));
    }
    let store = MemoryStore::new();
    engine.persist(&store).unwrap();
    let restored =
        Engine::restore(options, engine.pivots().to_vec(), FnMetric(l1), map, &store).unwrap();
    assert_eq!(
        restored.search(&[0, 0], 3, 50).unwrap(),
        engine.search(&[0, 0], 3, 50).unwrap()
    );
}
