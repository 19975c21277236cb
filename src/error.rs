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

use bitset::{BitsetError, ObjectId};
use projection::PolicyError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

pub type BoxedError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The operation is not allowed in the current lifecycle state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("value {value} cannot be represented in {width} bits")]
    EncodingOverflow { value: u64, width: u32 },
    #[error("storage failure: {0}")]
    Storage(#[source] BoxedError),
    #[error("distance callback failed: {0}")]
    DistanceCallback(#[source] BoxedError),
    #[error("invalid configuration: {0}")]
    Configuration(String),
    #[error("object {0} is already indexed")]
    DuplicateObject(ObjectId),
    #[error("object {0} is unknown")]
    UnknownObject(ObjectId),
    #[error("data corruption: {0}")]
    Corrupted(String),
}

impl Error {
    pub(crate) fn callback(e: impl std::error::Error + Send + Sync + 'static) -> Self {
        Error::DistanceCallback(Box::new(e))
    }
}

impl From<BitsetError> for Error {
    fn from(e: BitsetError) -> Self {
        match e {
            BitsetError::InvalidState(s) => Error::InvalidState(s.to_string()),
            BitsetError::EncodingOverflow { value, width } => {
                Error::EncodingOverflow { value, width }
            }
            BitsetError::InvalidWidth(_) => Error::Configuration(e.to_string()),
            BitsetError::Corrupted(s) => Error::Corrupted(s.to_string()),
        }
    }
}

impl From<PolicyError> for Error {
    fn from(e: PolicyError) -> Self {
        Error::Configuration(e.to_string())
    }
}

#[test]
fn test_error_mapping() {
    assert!(matches!(
        Error::from(BitsetError::EncodingOverflow {
            value: 300,
            width: 8
        }),
        Error::EncodingOverflow {
            value: 300,
            width: 8
        }
    ));
    assert!(matches!(
        Error::from(BitsetError::InvalidState("not committed")),
        Error::InvalidState(s) if s == "not committed"
    ));
    assert!(matches!(
        Error::from(BitsetError::InvalidWidth(0)),
        Error::Configuration(_)
    ));
    assert!(matches!(
        Error::from(BitsetError::Corrupted("truncated")),
        Error::Corrupted(_)
    ));
    assert!(matches!(
        Error::from(PolicyError::Bits(0)),
        Error::Configuration(_)
    ));
    let e = Error::callback(std::io::Error::other("unreachable"));
    assert_eq!(e.to_string(), "distance callback failed: unreachable");
    assert!(std::error::Error::source(&e).is_some());
}
