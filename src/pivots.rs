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

use crate::{Error, Result};
use rand::SeedableRng;
use rand::rngs::StdRng;

/// Chooses the reference objects an index projects onto.
pub trait PivotSelector<O> {
    fn select(&mut self, objects: &[O], count: usize) -> Result<Vec<O>>;
}

/// Distinct objects drawn uniformly from the sample.
#[derive(Debug, Clone)]
pub struct RandomPivots {
    rng: StdRng,
}

impl RandomPivots {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl<O: Clone> PivotSelector<O> for RandomPivots {
    fn select(&mut self, objects: &[O], count: usize) -> Result<Vec<O>> {
        if objects.len() < count {
            return Err(Error::Configuration(format!(
                "{count} pivots requested from {} objects",
                objects.len()
            )));
        }
        Ok(rand::seq::index::sample(&mut self.rng, objects.len(), count)
            .into_iter()
            .map(|i| objects[i].clone())
            .collect())
    }
}

#[test]
fn test_random_pivots() {
    let objects = (0..100).collect::<Vec<i32>>();
    let a = RandomPivots::new(42).select(&objects, 10).unwrap();
    let b = RandomPivots::new(42).select(&objects, 10).unwrap();
    assert_eq!(a, b);
    let mut c = a.clone();
    c.sort();
    c.dedup();
    assert_eq!(c.len(), 10);
    assert_eq!(RandomPivots::new(0).select(&objects, 100).unwrap().len(), 100);
    assert!(matches!(
        RandomPivots::new(0).select(&objects, 101),
        Err(Error::Configuration(_))
    ));
}
