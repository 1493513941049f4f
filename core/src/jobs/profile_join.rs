//! Inner join of per-user activity with user profiles.
//!
//! Input 0 holds activity lines `user\tactivity`, input 1 profile lines
//! `user,name,...` (optionally followed by tab-separated extras). Users present
//! in both come out as `user\tprofile\tactivity`.

use serde::{Deserialize, Serialize};

use crate::error::RecordError;
use crate::traits::{Emitter, Key, MapReduceJob, OutputRecord, Record};

pub const ACTIVITY_SOURCE: usize = 0;
pub const PROFILE_SOURCE: usize = 1;

/// A join-side value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tagged {
    Activity(String),
    Profile(String),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProfileJoin;

impl MapReduceJob for ProfileJoin {
    type Value = Tagged;
    type State = ();

    fn map(&self, record: &Record, _: &mut (), emitter: &mut Emitter<Tagged>) -> Result<(), RecordError> {
        let line = record.line.trim();
        match record.source {
            ACTIVITY_SOURCE => {
                let (user, activity) = line
                    .split_once('\t')
                    .ok_or_else(|| RecordError::missing_fields(2, 1))?;
                if user.is_empty() {
                    return Err(RecordError::missing_fields(2, 1));
                }
                emitter.emit(
                    Key::with_secondary(user, "A"),
                    Tagged::Activity(activity.to_string()),
                );
            }
            PROFILE_SOURCE => {
                let head = line.split('\t').next().unwrap_or_default();
                let user = head.split(',').next().unwrap_or_default();
                if user.is_empty() {
                    return Err(RecordError::missing_fields(1, 0));
                }
                emitter.emit(
                    Key::with_secondary(user, "P"),
                    Tagged::Profile(line.to_string()),
                );
            }
            other => {
                return Err(RecordError::new(
                    "unknown_source",
                    format!("join takes two inputs, got input {other}"),
                ));
            }
        }
        Ok(())
    }

    /// The last profile and the last activity of a user win.
    fn reduce(&self, key: &str, values: Vec<Tagged>, output: &mut Vec<OutputRecord>) -> anyhow::Result<()> {
        let mut profile = None;
        let mut activity = None;
        for value in values {
            match value {
                Tagged::Profile(p) => profile = Some(p),
                Tagged::Activity(a) => activity = Some(a),
            }
        }
        if let (Some(profile), Some(activity)) = (profile, activity) {
            output.push(OutputRecord::new(key, format!("{profile}\t{activity}")));
        }
        Ok(())
    }
}
