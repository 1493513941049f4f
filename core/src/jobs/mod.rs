//! Reference jobs of the social-media analytics workflow.
//!
//! Each job is a plain [`MapReduceJob`](crate::traits::MapReduceJob); [`JobKind`]
//! names them so pipelines can be described in configuration files.

pub mod action_aggregation;
pub mod cleansing;
pub mod counting;
pub mod profile_join;
pub mod trending;

use serde::{Deserialize, Serialize};

use crate::config::JobSpec;

pub use action_aggregation::{ActionAggregation, ActionCounts};
pub use cleansing::{Cleansing, is_valid_timestamp};
pub use counting::{KeySum, UserCount};
pub use profile_join::{ProfileJoin, Tagged};
pub use trending::TrendingContent;

/// Selects a reference job by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Cleansing,
    ActionAggregation,
    TrendingContent {
        /// Fixed engagement threshold; negative or absent means the 90th percentile
        #[serde(default)]
        threshold: Option<i64>,
    },
    ProfileJoin,
    UserCount,
    KeySum,
}

impl JobKind {
    /// A spec running this job under `name` with the job's default settings.
    pub fn into_spec(self, name: impl Into<String>) -> JobSpec {
        match self {
            JobKind::Cleansing => JobSpec::new(name, Cleansing),
            JobKind::ActionAggregation => JobSpec::new(name, ActionAggregation),
            JobKind::TrendingContent { threshold } => JobSpec::new(
                name,
                TrendingContent::new(threshold.and_then(|t| u64::try_from(t).ok())),
            ),
            JobKind::ProfileJoin => JobSpec::new(name, ProfileJoin),
            JobKind::UserCount => JobSpec::new(name, UserCount),
            JobKind::KeySum => JobSpec::new(name, KeySum),
        }
    }
}
