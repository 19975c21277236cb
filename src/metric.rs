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

use distance::{Distance, Scalar};
use std::convert::Infallible;

/// A distance function satisfying the triangle inequality.
///
/// Metrics are shared by every refinement worker, so they must be
/// thread-safe.
pub trait Metric<O: ?Sized>: Send + Sync {
    type Distance: Scalar;
    type Error: std::error::Error + Send + Sync + 'static;

    fn distance(&self, a: &O, b: &O) -> Result<Self::Distance, Self::Error>;
}

/// Wraps a fallible closure as a [`Metric`].
#[derive(Debug, Clone, Copy)]
pub struct FnMetric<F>(pub F);

impl<O: ?Sized, D, E, F> Metric<O> for FnMetric<F>
where
    D: Scalar,
    E: std::error::Error + Send + Sync + 'static,
    F: Fn(&O, &O) -> Result<D, E> + Send + Sync,
{
    type Distance = D;
    type Error = E;

    fn distance(&self, a: &O, b: &O) -> Result<D, E> {
        (self.0)(a, b)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetricError {
    #[error("dimensions differ: {left} and {right}")]
    Dimensions { left: usize, right: usize },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Euclidean;

impl Metric<Vec<f32>> for Euclidean {
    type Distance = Distance;
    type Error = MetricError;

    fn distance(&self, a: &Vec<f32>, b: &Vec<f32>) -> Result<Distance, MetricError> {
        if a.len() != b.len() {
            return Err(MetricError::Dimensions {
                left: a.len(),
                right: b.len(),
            });
        }
        let mut sum = 0.0f32;
        for (&x, &y) in a.iter().zip(b.iter()) {
            sum += (x - y) * (x - y);
        }
        Ok(Distance::from_f32(sum.sqrt()))
    }
}

/// Edit distance between strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct Levenshtein;

impl Metric<String> for Levenshtein {
    type Distance = u32;
    type Error = Infallible;

    fn distance(&self, a: &String, b: &String) -> Result<u32, Infallible> {
        Ok(u32::try_from(strsim::levenshtein(a, b)).unwrap_or(u32::MAX))
    }
}

#[test]
fn test_euclidean() {
    let d = Euclidean.distance(&vec![0.0, 0.0], &vec![3.0, 4.0]).unwrap();
    assert_eq!(d.to_f32(), 5.0);
    assert_eq!(
        Euclidean.distance(&vec![1.0, 2.0], &vec![1.0, 2.0]).unwrap(),
        Distance::ZERO
    );
    assert_eq!(
        Euclidean.distance(&vec![1.0], &vec![1.0, 2.0]),
        Err(MetricError::Dimensions { left: 1, right: 2 })
    );
}

#[test]
fn test_levenshtein() {
    let m = Levenshtein;
    assert_eq!(m.distance(&"kitten".into(), &"sitting".into()), Ok(3));
    assert_eq!(m.distance(&"".into(), &"abc".into()), Ok(3));
    assert_eq!(m.distance(&"same".into(), &"same".into()), Ok(0));
}

#[test]
fn test_fn_metric() {
    let m = FnMetric(|a: &i64, b: &i64| Ok::<_, Infallible>(a.abs_diff(*b)));
    assert_eq!(m.distance(&-3, &4), Ok(7u64));
}
