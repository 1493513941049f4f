//! Pipeline description files.
//!
//! A pipeline file is JSON: engine settings at the top level, plus the input
//! paths, the output directory and the ordered job list. Relative paths are
//! taken relative to the directory holding the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use skewer_common::{CommonError, ErrorContext};
use skewer_core::{EngineConfig, InputRef, JobKind, JobSpec, Pipeline, SkewConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub inputs: Vec<PathBuf>,
    pub output_dir: PathBuf,
    #[serde(flatten)]
    pub engine: EngineConfig,
    pub jobs: Vec<JobConfig>,
}

/// One job entry. Unset fields fall back to the job's and engine's defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub name: String,
    pub kind: JobKind,
    #[serde(default)]
    pub reducer_count: Option<usize>,
    #[serde(default)]
    pub combiner: Option<bool>,
    #[serde(default)]
    pub skew: Option<SkewConfig>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub max_discard_rate: Option<f64>,
    #[serde(default)]
    pub inputs: Option<Vec<InputRef>>,
}

impl PipelineConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let body = std::fs::read_to_string(path)
            .with_io_context(|| format!("failed to read pipeline config {}", path.display()))?;
        let mut config: PipelineConfig = serde_json::from_str(&body)
            .with_deserialization_context(|| format!("invalid pipeline config {}", path.display()))?;
        if let Some(base) = path.parent() {
            config.resolve_relative(base);
        }
        Ok(config)
    }

    fn resolve_relative(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        self.inputs.iter_mut().for_each(resolve);
        resolve(&mut self.output_dir);
        for job in &mut self.jobs {
            for input in job.inputs.iter_mut().flatten() {
                if let InputRef::Path(p) = input {
                    resolve(p);
                }
            }
        }
    }

    pub fn into_pipeline(self) -> Result<Pipeline> {
        if self.jobs.is_empty() {
            return Err(CommonError::configuration_error("pipeline config has no jobs").into());
        }
        let mut pipeline = Pipeline::new(self.engine, self.output_dir).with_inputs(self.inputs);
        for job in self.jobs {
            pipeline.add_job(job.into_spec());
        }
        pipeline
            .validate()
            .with_config_context(|| "pipeline failed validation".to_string())?;
        Ok(pipeline)
    }
}

impl JobConfig {
    pub fn into_spec(self) -> JobSpec {
        let mut spec = self.kind.into_spec(self.name);
        if let Some(enabled) = self.combiner {
            spec = spec.with_combiner(enabled);
        }
        if let Some(reducers) = self.reducer_count {
            spec = spec.with_reducer_count(reducers);
        }
        if let Some(skew) = self.skew {
            spec = spec.with_skew(skew);
        }
        if let Some(secs) = self.timeout_secs {
            spec = spec.with_timeout(Duration::from_secs(secs));
        }
        if let Some(rate) = self.max_discard_rate {
            spec = spec.with_max_discard_rate(rate);
        }
        if let Some(inputs) = self.inputs {
            spec = spec.with_inputs(inputs);
        }
        spec
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skewer_core::{FailurePolicy, SkewThreshold};
    use tempfile::TempDir;

    const WORKFLOW: &str = r#"{
        "inputs": ["logs.tsv"],
        "output_dir": "out",
        "workers": 2,
        "failure_policy": "best_effort",
        "jobs": [
            {"name": "clean", "kind": "cleansing", "max_discard_rate": 0.2},
            {"name": "actions", "kind": "action_aggregation", "reducer_count": 8,
             "skew": {"strategy": {"percentile": 95.0}, "min_hot_count": 10}},
            {"name": "trending", "kind": {"trending_content": {"threshold": 3}},
             "inputs": [{"job": "clean"}], "timeout_secs": 30},
            {"name": "joined", "kind": "profile_join", "combiner": false,
             "inputs": [{"job": "actions"}, {"path": "/data/profiles.csv"}]}
        ]
    }"#;

    #[test]
    fn test_load_resolves_relative_paths() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pipeline.json");
        std::fs::write(&path, WORKFLOW).unwrap();

        let config = PipelineConfig::load(&path).unwrap();

        assert_eq!(config.inputs, vec![dir.path().join("logs.tsv")]);
        assert_eq!(config.output_dir, dir.path().join("out"));
        assert_eq!(config.engine.workers, 2);
        assert_eq!(config.engine.failure_policy, FailurePolicy::BestEffort);
        assert_eq!(
            config.jobs[3].inputs.as_ref().unwrap()[1],
            InputRef::Path(PathBuf::from("/data/profiles.csv"))
        );
    }

    #[test]
    fn test_job_settings_reach_specs() {
        let config: PipelineConfig = serde_json::from_str(WORKFLOW).unwrap();
        let pipeline = config.into_pipeline().unwrap();
        let jobs = pipeline.jobs();

        assert_eq!(jobs[0].max_discard_rate, Some(0.2));
        assert_eq!(jobs[0].inputs, vec![InputRef::Previous]);
        assert_eq!(jobs[1].reducer_count, Some(8));
        assert_eq!(jobs[1].skew.strategy, SkewThreshold::Percentile(95.0));
        assert_eq!(jobs[1].skew.min_hot_count, 10);
        assert!(jobs[1].combiner);
        assert_eq!(jobs[2].timeout, Some(Duration::from_secs(30)));
        assert!(!jobs[3].combiner);
    }

    fn is_config_error(err: &anyhow::Error) -> bool {
        matches!(
            err.downcast_ref::<CommonError>(),
            Some(CommonError::ConfigurationError { .. })
        )
    }

    #[test]
    fn test_rejects_invalid_pipelines() {
        let empty: PipelineConfig =
            serde_json::from_str(r#"{"output_dir": "out", "jobs": []}"#).unwrap();
        assert!(is_config_error(&empty.into_pipeline().unwrap_err()));

        let unknown: PipelineConfig = serde_json::from_str(
            r#"{"inputs": ["a"], "output_dir": "out",
                "jobs": [{"name": "x", "kind": "user_count", "inputs": [{"job": "nope"}]}]}"#,
        )
        .unwrap();
        let err = unknown.into_pipeline().unwrap_err();
        assert!(is_config_error(&err));
        assert!(format!("{err:#}").contains("nope"));

        let bad_kind = serde_json::from_str::<PipelineConfig>(
            r#"{"output_dir": "out", "jobs": [{"name": "x", "kind": "word_count"}]}"#,
        );
        assert!(bad_kind.is_err());
    }

    #[test]
    fn test_load_errors_are_categorized() {
        let dir = TempDir::new().unwrap();

        let err = PipelineConfig::load(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CommonError>(),
            Some(CommonError::IoError { .. })
        ));

        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{\"output_dir\": ").unwrap();
        let err = PipelineConfig::load(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CommonError>(),
            Some(CommonError::DeserializationError { .. })
        ));
    }
}
