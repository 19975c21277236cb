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

use crate::{Permutation, Projection, ProxyComparable, Sketch};
use bitset::ObjectId;
use serde::{Deserialize, Serialize};
use std::num::NonZero;
use topk::BoundedTopK;

pub const MAX_PIVOTS: u16 = 1024;
pub const MAX_BITS: u16 = 1024;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    #[error("number of pivots must be in 1..=1024, got {0}")]
    Pivots(u16),
    #[error("prefix must be in 1..={pivots}, got {prefix}")]
    Prefix { prefix: u16, pivots: u16 },
    #[error("sketch width must be in 1..=1024, got {0}")]
    Bits(u16),
    #[error("level must be at most {limit}, got {level}")]
    Level { level: u16, limit: u16 },
}

/// How objects are projected and compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum Policy {
    /// Pivot ranks cut at `prefix`, compared by the positional footrule.
    Permutation { pivots: u16, prefix: u16 },
    /// One bit per pivot pair, compared by Hamming distance.
    Sketch { bits: u16 },
}

impl Default for Policy {
    fn default() -> Self {
        Policy::Permutation {
            pivots: 32,
            prefix: 8,
        }
    }
}

impl Policy {
    pub fn check(self) -> Result<(), PolicyError> {
        match self {
            Policy::Permutation { pivots, prefix } => {
                if !(1..=MAX_PIVOTS).contains(&pivots) {
                    return Err(PolicyError::Pivots(pivots));
                }
                if !(1..=pivots).contains(&prefix) {
                    return Err(PolicyError::Prefix { prefix, pivots });
                }
            }
            Policy::Sketch { bits } => {
                if !(1..=MAX_BITS).contains(&bits) {
                    return Err(PolicyError::Bits(bits));
                }
            }
        }
        Ok(())
    }

    /// Number of pivots a projection consumes.
    pub fn pivots(self) -> usize {
        match self {
            Policy::Permutation { pivots, .. } => pivots as usize,
            Policy::Sketch { bits } => 2 * bits as usize,
        }
    }

    /// The finest level [`Projection::coarsen`] can keep.
    pub fn max_level(self) -> u16 {
        match self {
            Policy::Permutation { prefix, .. } => prefix,
            Policy::Sketch { bits } => bits,
        }
    }

    pub fn check_level(self, level: u16) -> Result<(), PolicyError> {
        let limit = self.max_level();
        if level > limit {
            return Err(PolicyError::Level { level, limit });
        }
        Ok(())
    }

    /// Whether `projection` has the shape [`Projector::project`] gives under
    /// this policy, coarsened to `level`.
    pub fn matches(self, projection: &Projection, level: u16) -> bool {
        match (self, projection) {
            (Policy::Permutation { pivots, prefix }, Projection::Permutation(x)) => {
                x.len() == pivots as usize && x.prefix() == level.min(prefix)
            }
            (Policy::Sketch { bits }, Projection::Sketch(x)) => x.bits() == level.min(bits),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Projector {
    policy: Policy,
}

impl Projector {
    pub fn new(policy: Policy) -> Result<Self, PolicyError> {
        policy.check()?;
        Ok(Self { policy })
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    pub fn pivots(&self) -> usize {
        self.policy.pivots()
    }

    /// Projects `object` onto `pivots`. The same inputs give the same output.
    ///
    /// The first error of `distance` is returned as is.
    pub fn project<O: ?Sized, P, D: Ord, E>(
        &self,
        object: &O,
        pivots: &[P],
        mut distance: impl FnMut(&O, &P) -> Result<D, E>,
    ) -> Result<Projection, E> {
        assert_eq!(pivots.len(), self.pivots(), "unmatched number of pivots");
        let distances = pivots
            .iter()
            .map(|pivot| distance(object, pivot))
            .collect::<Result<Vec<_>, E>>()?;
        Ok(match self.policy {
            Policy::Permutation { prefix, .. } => {
                Projection::Permutation(Permutation::from_distances(&distances, prefix))
            }
            Policy::Sketch { .. } => Projection::Sketch(Sketch::from_pairs(&distances)),
        })
    }

    /// The `k` candidates closest to `query` by proxy distance, ascending,
    /// ties in candidate order.
    pub fn shortlist<'a>(
        &self,
        query: &Projection,
        candidates: impl IntoIterator<Item = (ObjectId, &'a Projection)>,
        k: NonZero<usize>,
    ) -> Vec<(ObjectId, u32)> {
        let mut results = BoundedTopK::new(k);
        for (id, projection) in candidates {
            let distance = query.proxy_distance(projection);
            if results.admits(distance) {
                results.add(id, distance);
            }
        }
        results.into_sorted_vec()
    }
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

#[test]
fn test_policy_checks() {
    assert_eq!(Policy::default().check(), Ok(()));
    assert_eq!(
        Policy::Permutation {
            pivots: 0,
            prefix: 0
        }
        .check(),
        Err(PolicyError::Pivots(0))
    );
    assert_eq!(
        Policy::Permutation {
            pivots: 4,
            prefix: 5
        }
        .check(),
        Err(PolicyError::Prefix {
            prefix: 5,
            pivots: 4
        })
    );
    assert_eq!(
        Policy::Sketch { bits: 2000 }.check(),
        Err(PolicyError::Bits(2000))
    );
    assert_eq!(Policy::Sketch { bits: 16 }.pivots(), 32);
    assert_eq!(
        Policy::Sketch { bits: 16 }.check_level(17),
        Err(PolicyError::Level {
            level: 17,
            limit: 16
        })
    );
    assert!(Projector::new(Policy::Sketch { bits: 0 }).is_err());
}

#[test]
fn test_project_is_deterministic() {
    use rand::SeedableRng;
    let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(7);
    let pivots = points(&mut rng, 16);
    let objects = points(&mut rng, 100);
    for policy in [
        Policy::Permutation {
            pivots: 16,
            prefix: 5,
        },
        Policy::Sketch { bits: 8 },
    ] {
        let projector = Projector::new(policy).unwrap();
        for object in objects.iter() {
            let a = projector.project(object, &pivots, l1).unwrap();
            let b = projector.project(object, &pivots, l1).unwrap();
            assert_eq!(a, b);
            assert_eq!(a.proxy_distance(&b), 0);
        }
    }
}

#[test]
fn test_pivot_is_closest_to_itself() {
    use rand::SeedableRng;
    let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(11);
    let pivots = points(&mut rng, 8);
    let projector = Projector::new(Policy::Permutation {
        pivots: 8,
        prefix: 3,
    })
    .unwrap();
    for (i, pivot) in pivots.iter().enumerate() {
        let Projection::Permutation(x) = projector.project(pivot, &pivots, l1).unwrap() else {
            unreachable!()
        };
        assert_eq!(x.order()[0], i as u16);
    }
}

#[test]
fn test_project_propagates_errors() {
    let projector = Projector::new(Policy::Sketch { bits: 2 }).unwrap();
    let mut calls = 0;
    let result = projector.project(&0i32, &[1, 2, 3, 4], |_, &p| {
        calls += 1;
        if p == 2 { Err("unreachable pivot") } else { Ok(p) }
    });
    assert_eq!(result, Err("unreachable pivot"));
    assert_eq!(calls, 2);
}

#[test]
#[should_panic(expected = "unmatched number of pivots")]
fn test_project_checks_pivots() {
    let projector = Projector::new(Policy::Sketch { bits: 2 }).unwrap();
    let _ = projector.project(&[0, 0], &[[1, 1]], l1);
}

#[test]
fn test_shortlist_matches_sort() {
    use rand::SeedableRng;
    let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(13);
    let pivots = points(&mut rng, 24);
    let objects = points(&mut rng, 2000);
    let projector = Projector::new(Policy::Permutation {
        pivots: 24,
        prefix: 6,
    })
    .unwrap();
    let projections = objects
        .iter()
        .map(|o| projector.project(o, &pivots, l1).unwrap())
        .collect::<Vec<_>>();
    let query = projector.project(&[3, -7], &pivots, l1).unwrap();
    let k = 50;
    let answer = {
        let mut all = projections
            .iter()
            .enumerate()
            .map(|(i, p)| (i as ObjectId, query.proxy_distance(p)))
            .collect::<Vec<_>>();
        all.sort_by_key(|&(_, d)| d);
        all.truncate(k);
        all
    };
    let result = projector.shortlist(
        &query,
        projections.iter().enumerate().map(|(i, p)| (i as ObjectId, p)),
        NonZero::new(k).unwrap(),
    );
    assert_eq!(result, answer);
}

#[test]
fn test_policy_matches() {
    let permutation = Policy::Permutation {
        pivots: 4,
        prefix: 2,
    };
    let sketch = Policy::Sketch { bits: 2 };
    let pivots = [[0, 0], [10, 0], [0, 10], [10, 10]];
    let x = Projector::new(permutation)
        .unwrap()
        .project(&[1, 2], &pivots, l1)
        .unwrap();
    let y = Projector::new(sketch)
        .unwrap()
        .project(&[1, 2], &pivots, l1)
        .unwrap();
    assert!(permutation.matches(&x, permutation.max_level()));
    assert!(permutation.matches(&x.coarsen(1), 1));
    assert!(permutation.matches(&x.coarsen(0), 0));
    assert!(!permutation.matches(&x, 1));
    assert!(!permutation.matches(&y, 2));
    assert!(sketch.matches(&y, 2));
    assert!(sketch.matches(&y.coarsen(1), 1));
    assert!(!sketch.matches(&x, 2));
    // a permutation over another number of pivots
    let z = Projection::Permutation(Permutation::from_distances(&[3u32, 1, 2], 2));
    assert!(!permutation.matches(&z, 2));
}
