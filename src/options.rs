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
use bitset::GapCode;
use projection::Policy;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use validator::{Validate, ValidationError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
#[validate(schema(function = "Self::validate_self"))]
pub struct IndexOptions {
    #[serde(default)]
    pub projection: Policy,
    /// Level of the projection prefix that keys a bucket. Zero keeps every
    /// object in one bucket.
    #[serde(default)]
    pub bucket_level: u16,
    #[serde(default)]
    pub gap_code: GapCode,
    #[serde(default = "IndexOptions::default_threads")]
    #[validate(range(min = 1, max = 256))]
    pub threads: u32,
    /// Buckets are probed until `overscan * max_candidates` identifiers
    /// were scanned.
    #[serde(default = "IndexOptions::default_overscan")]
    #[validate(range(min = 1, max = 1024))]
    pub overscan: u32,
}

impl IndexOptions {
    fn default_threads() -> u32 {
        4
    }
    fn default_overscan() -> u32 {
        4
    }

    pub fn validate_self(&self) -> Result<(), ValidationError> {
        let reason = if let Err(e) = self.projection.check() {
            e.to_string()
        } else if let Err(e) = self.projection.check_level(self.bucket_level) {
            e.to_string()
        } else if let Err(e) = self.gap_code.check() {
            e.to_string()
        } else {
            return Ok(());
        };
        Err(ValidationError::new("invalid index options").with_message(Cow::Owned(reason)))
    }

    pub fn check(&self) -> Result<()> {
        self.validate()
            .map_err(|e| Error::Configuration(e.to_string()))
    }

    pub fn from_toml(source: &str) -> Result<Self> {
        let options: Self =
            toml::from_str(source).map_err(|e| Error::Configuration(e.to_string()))?;
        options.check()?;
        Ok(options)
    }
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            projection: Policy::default(),
            bucket_level: 0,
            gap_code: GapCode::default(),
            threads: Self::default_threads(),
            overscan: Self::default_overscan(),
        }
    }
}

#[test]
fn test_defaults() {
    let options = IndexOptions::from_toml("").unwrap();
    assert_eq!(options, IndexOptions::default());
    assert_eq!(
        options.projection,
        Policy::Permutation {
            pivots: 32,
            prefix: 8
        }
    );
    assert_eq!(options.gap_code, GapCode::Delta);
    assert_eq!(options.threads, 4);
    assert!(options.check().is_ok());
}

#[test]
fn test_from_toml() {
    let options = IndexOptions::from_toml(
        r#"
        bucket_level = 5
        gap_code = "gamma"
        threads = 2
        overscan = 16

        [projection]
        policy = "sketch"
        bits = 64
        "#,
    )
    .unwrap();
    assert_eq!(options.projection, Policy::Sketch { bits: 64 });
    assert_eq!(options.bucket_level, 5);
    assert_eq!(options.gap_code, GapCode::Gamma);
    assert_eq!(options.threads, 2);
    assert_eq!(options.overscan, 16);

    let options = IndexOptions::from_toml("gap_code = { fixed = 20 }").unwrap();
    assert_eq!(options.gap_code, GapCode::Fixed(20));
}

#[test]
fn test_rejects_invalid() {
    for source in [
        "threads = 0",
        "threads = 1000",
        "overscan = 0",
        "unknown = 1",
        "gap_code = \"unary\"",
        "gap_code = { fixed = 0 }",
        "gap_code = { fixed = 65 }",
        "bucket_level = 9",
        "[projection]\npolicy = \"permutation\"\npivots = 4\nprefix = 5",
        "[projection]\npolicy = \"sketch\"\nbits = 0",
        "bucket_level = 5\n[projection]\npolicy = \"sketch\"\nbits = 4",
    ] {
        assert!(
            matches!(IndexOptions::from_toml(source), Err(Error::Configuration(_))),
            "accepted {source:?}"
        );
    }
}

#[test]
fn test_json_round_trip() {
    let options = IndexOptions {
        projection: Policy::Sketch { bits: 12 },
        bucket_level: 3,
        gap_code: GapCode::Fixed(17),
        threads: 8,
        overscan: 2,
    };
    let json = serde_json::to_string(&options).unwrap();
    assert_eq!(serde_json::from_str::<IndexOptions>(&json).unwrap(), options);
}
