//! Per-user action totals, ranked by post count.
//!
//! Reads cleansed records (`user\ttimestamp\taction\t...`) and emits
//! `user\tposts:N,likes:N,comments:N,shares:N`, most prolific posters first.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};

use crate::error::RecordError;
use crate::metrics::Counters;
use crate::traits::{Emitter, MapReduceJob, OutputRecord, Record};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionCounts {
    pub posts: u64,
    pub likes: u64,
    pub comments: u64,
    pub shares: u64,
}

impl ActionCounts {
    /// Count one action; unknown action types are ignored.
    pub fn record(&mut self, action: &str) -> bool {
        let slot = match action.to_ascii_lowercase().as_str() {
            "post" => &mut self.posts,
            "like" => &mut self.likes,
            "comment" => &mut self.comments,
            "share" => &mut self.shares,
            _ => return false,
        };
        *slot += 1;
        true
    }

    pub fn merge(&mut self, other: &ActionCounts) {
        self.posts += other.posts;
        self.likes += other.likes;
        self.comments += other.comments;
        self.shares += other.shares;
    }

    pub fn total<'a>(counts: impl IntoIterator<Item = &'a ActionCounts>) -> ActionCounts {
        counts.into_iter().fold(ActionCounts::default(), |mut acc, c| {
            acc.merge(c);
            acc
        })
    }
}

impl fmt::Display for ActionCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "posts:{},likes:{},comments:{},shares:{}",
            self.posts, self.likes, self.comments, self.shares
        )
    }
}

impl FromStr for ActionCounts {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut counts = ActionCounts::default();
        for part in s.split(',') {
            let (name, value) = part
                .split_once(':')
                .ok_or_else(|| anyhow!("expected `name:count`, got `{part}`"))?;
            let value: u64 = value
                .parse()
                .with_context(|| format!("count of `{name}` is not a number"))?;
            match name {
                "posts" => counts.posts = value,
                "likes" => counts.likes = value,
                "comments" => counts.comments = value,
                "shares" => counts.shares = value,
                other => return Err(anyhow!("unknown action total `{other}`")),
            }
        }
        Ok(counts)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ActionAggregation;

impl MapReduceJob for ActionAggregation {
    type Value = ActionCounts;
    type State = BTreeMap<String, ActionCounts>;

    fn map(
        &self,
        record: &Record,
        state: &mut Self::State,
        _emitter: &mut Emitter<ActionCounts>,
    ) -> Result<(), RecordError> {
        let fields: Vec<&str> = record.line.trim().split('\t').collect();
        if fields.len() < 3 {
            return Err(RecordError::missing_fields(3, fields.len()));
        }
        let mut counts = ActionCounts::default();
        if counts.record(fields[2]) {
            state.entry(fields[0].to_string()).or_default().merge(&counts);
        }
        Ok(())
    }

    fn flush(&self, state: Self::State, emitter: &mut Emitter<ActionCounts>) {
        for (user, counts) in state {
            emitter.emit(user, counts);
        }
    }

    fn has_combiner(&self) -> bool {
        true
    }

    fn combine(&self, _key: &str, values: Vec<ActionCounts>) -> Vec<ActionCounts> {
        vec![ActionCounts::total(&values)]
    }

    fn reduce(
        &self,
        key: &str,
        values: Vec<ActionCounts>,
        output: &mut Vec<OutputRecord>,
    ) -> anyhow::Result<()> {
        output.push(OutputRecord::new(key, ActionCounts::total(&values).to_string()));
        Ok(())
    }

    /// Rank by posts descending, ties by user id ascending.
    fn finish(&self, records: &mut Vec<OutputRecord>, _counters: &Counters) -> anyhow::Result<()> {
        let mut ranked = Vec::with_capacity(records.len());
        for record in records.drain(..) {
            let counts: ActionCounts = record
                .value
                .parse()
                .with_context(|| format!("totals of user `{}`", record.key))?;
            ranked.push((counts.posts, record));
        }
        ranked.sort_by(|(a_posts, a), (b_posts, b)| {
            b_posts.cmp(a_posts).then_with(|| a.key.cmp(&b.key))
        });
        records.extend(ranked.into_iter().map(|(_, record)| record));
        Ok(())
    }
}
