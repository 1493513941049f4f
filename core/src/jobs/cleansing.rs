//! Validation of raw activity logs.
//!
//! Input lines are `timestamp\tuser_id\taction\tcontent_id\tmetadata_json`.
//! Valid records are re-keyed by user and come out in timestamp order per
//! user: `user_id\ttimestamp\taction\tcontent_id\tmetadata_json`.

use chrono::NaiveDateTime;

use crate::error::RecordError;
use crate::traits::{Emitter, Key, MapReduceJob, OutputRecord, Record};

const FIELDS: usize = 5;
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Clone, Copy, Default)]
pub struct Cleansing;

impl MapReduceJob for Cleansing {
    type Value = String;
    type State = ();

    fn map(
        &self,
        record: &Record,
        _: &mut (),
        emitter: &mut Emitter<String>,
    ) -> Result<(), RecordError> {
        let fields: Vec<&str> = record.line.trim().split('\t').collect();
        if fields.len() < FIELDS {
            return Err(RecordError::missing_fields(FIELDS, fields.len()));
        }
        let (timestamp, user, action, content, metadata) =
            (fields[0], fields[1], fields[2], fields[3], fields[4]);

        if !is_valid_timestamp(timestamp) {
            return Err(RecordError::new("invalid_timestamp", timestamp));
        }
        serde_json::from_str::<serde_json::Value>(metadata)
            .map_err(|e| RecordError::new("malformed_json", e.to_string()))?;

        emitter.emit(
            Key::with_secondary(user, timestamp),
            format!("{timestamp}\t{action}\t{content}\t{metadata}"),
        );
        Ok(())
    }

    fn reduce(
        &self,
        key: &str,
        values: Vec<String>,
        output: &mut Vec<OutputRecord>,
    ) -> anyhow::Result<()> {
        output.extend(values.into_iter().map(|value| OutputRecord::new(key, value)));
        Ok(())
    }
}

/// `YYYY-MM-DDThh:mm:ss` with an optional trailing `Z`, naming a real
/// calendar instant.
pub fn is_valid_timestamp(timestamp: &str) -> bool {
    let body = timestamp.strip_suffix('Z').unwrap_or(timestamp);
    has_timestamp_shape(body) && NaiveDateTime::parse_from_str(body, TIMESTAMP_FORMAT).is_ok()
}

fn has_timestamp_shape(body: &str) -> bool {
    let bytes = body.as_bytes();
    bytes.len() == 19
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            10 => *b == b'T',
            13 | 16 => *b == b':',
            _ => b.is_ascii_digit(),
        })
}
