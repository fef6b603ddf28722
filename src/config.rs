//! Profiler thresholds and their optional TOML loading.

use serde::{Deserialize, Serialize};

use std::path::Path;

use crate::{ProfilerError, ProfilerResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ProfilerOptions {
    /// A checkpoint whose `elapsed_since_last` exceeds this is a slow operation.
    pub slow_threshold_seconds: f64,
    /// Slow operations above this are tagged "very slow".
    pub very_slow_threshold_seconds: f64,
    /// Consecutive checkpoints further apart than this are reported as a gap.
    pub gap_threshold_seconds: f64,
    /// Timeline text omits checkpoints at or below this delta.
    pub timeline_noise_seconds: f64,
    pub top_n_queries: usize,
    pub top_n_network_calls: usize,
    /// Query text is truncated to this many characters.
    pub query_text_limit: usize,
    /// Checkpoint labels are truncated to this many characters.
    pub label_limit: usize,
    /// Queries slower than this print their call site.
    pub query_backtrace_threshold_seconds: f64,
    /// Path fragment marking application (non-framework) code in backtraces.
    pub app_code_marker: String,
    pub heuristics: HeuristicOptions,
}

/// Fixed-threshold diagnostic checks run at the end of the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct HeuristicOptions {
    pub late_checkpoint_label: String,
    pub late_checkpoint_seconds: f64,
    pub after_checkpoint_label: String,
    pub after_checkpoint_seconds: f64,
    pub init_label: String,
    pub init_seconds: f64,
    pub max_queries: usize,
    pub queue_seconds: f64,
    pub overall_warning_seconds: f64,
    pub overall_issue_seconds: f64,
    pub execution_issue_seconds: f64,
}

impl Default for ProfilerOptions {
    fn default() -> Self {
        Self {
            slow_threshold_seconds: 0.1,
            very_slow_threshold_seconds: 1.0,
            gap_threshold_seconds: 0.5,
            timeline_noise_seconds: 0.01,
            top_n_queries: 10,
            top_n_network_calls: 10,
            query_text_limit: 500,
            label_limit: 300,
            query_backtrace_threshold_seconds: 0.1,
            app_code_marker: "wp-content".to_string(),
            heuristics: HeuristicOptions::default(),
        }
    }
}

impl Default for HeuristicOptions {
    fn default() -> Self {
        Self {
            late_checkpoint_label: crate::labels::BEFORE_ACTIONS.to_string(),
            late_checkpoint_seconds: 1.0,
            after_checkpoint_label: crate::labels::BEFORE_ACTIONS.to_string(),
            after_checkpoint_seconds: 2.0,
            init_label: crate::labels::INIT.to_string(),
            init_seconds: 1.0,
            max_queries: 100,
            queue_seconds: 1.0,
            overall_warning_seconds: 1.0,
            overall_issue_seconds: 3.0,
            execution_issue_seconds: 2.0,
        }
    }
}

impl ProfilerOptions {
    pub fn from_toml_str(s: &str) -> ProfilerResult<Self> {
        let options: ProfilerOptions = toml::from_str(s)?;
        options.validate()?;
        Ok(options)
    }

    /// Loads options from `path`, falling back to defaults when the file is
    /// missing or unusable.
    pub fn load_optional(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(s) => match Self::from_toml_str(&s) {
                Ok(options) => options,
                Err(err) => {
                    tracing::warn!("failed to parse profiler options {}: {err}", path.display());
                    Self::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(err) => {
                tracing::warn!("failed to read profiler options {}: {err}", path.display());
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> ProfilerResult<()> {
        let h = &self.heuristics;
        let thresholds = [
            ("slow_threshold_seconds", self.slow_threshold_seconds),
            ("very_slow_threshold_seconds", self.very_slow_threshold_seconds),
            ("gap_threshold_seconds", self.gap_threshold_seconds),
            ("timeline_noise_seconds", self.timeline_noise_seconds),
            (
                "query_backtrace_threshold_seconds",
                self.query_backtrace_threshold_seconds,
            ),
            ("heuristics.late_checkpoint_seconds", h.late_checkpoint_seconds),
            ("heuristics.after_checkpoint_seconds", h.after_checkpoint_seconds),
            ("heuristics.init_seconds", h.init_seconds),
            ("heuristics.queue_seconds", h.queue_seconds),
            ("heuristics.overall_warning_seconds", h.overall_warning_seconds),
            ("heuristics.overall_issue_seconds", h.overall_issue_seconds),
            ("heuristics.execution_issue_seconds", h.execution_issue_seconds),
        ];
        for (name, value) in thresholds {
            if !value.is_finite() || value < 0.0 {
                return Err(ProfilerError::Config(format!(
                    "{name} must be a finite, non-negative number of seconds (got {value})"
                )));
            }
        }
        if self.very_slow_threshold_seconds < self.slow_threshold_seconds {
            return Err(ProfilerError::Config(format!(
                "very_slow_threshold_seconds ({}) is below slow_threshold_seconds ({})",
                self.very_slow_threshold_seconds, self.slow_threshold_seconds
            )));
        }
        if h.overall_issue_seconds < h.overall_warning_seconds {
            return Err(ProfilerError::Config(format!(
                "heuristics.overall_issue_seconds ({}) is below heuristics.overall_warning_seconds ({})",
                h.overall_issue_seconds, h.overall_warning_seconds
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_workspace(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir()
            .join("reqprof-config-tests")
            .join(format!("{name}-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).expect("workspace");
        dir
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let options = ProfilerOptions::from_toml_str(
            r#"
slow_threshold_seconds = 0.25
top_n_queries = 3

[heuristics]
after_checkpoint_seconds = 5.0
"#,
        )
        .expect("options");
        assert_eq!(options.slow_threshold_seconds, 0.25);
        assert_eq!(options.very_slow_threshold_seconds, 1.0);
        assert_eq!(options.top_n_queries, 3);
        assert_eq!(options.heuristics.after_checkpoint_seconds, 5.0);
        assert_eq!(options.heuristics.late_checkpoint_label, "BEFORE_ACTIONS");
    }

    #[test]
    fn inverted_thresholds_are_config_errors() {
        let err = ProfilerOptions::from_toml_str(
            "slow_threshold_seconds = 2.0\nvery_slow_threshold_seconds = 1.0\n",
        )
        .expect_err("must fail");
        match err {
            ProfilerError::Config(msg) => assert!(msg.contains("very_slow"), "message: {msg}"),
            other => panic!("expected config error, got {other:?}"),
        }

        let err = ProfilerOptions::from_toml_str("gap_threshold_seconds = -1.0\n")
            .expect_err("negative gap");
        assert!(matches!(err, ProfilerError::Config(_)));
    }

    #[test]
    fn load_optional_falls_back_to_defaults() {
        let ws = temp_workspace("load-optional");
        let missing = ws.join("missing.toml");
        assert_eq!(ProfilerOptions::load_optional(&missing), ProfilerOptions::default());

        let broken = ws.join("broken.toml");
        std::fs::write(&broken, "slow_threshold_seconds = \"fast\"").expect("write");
        assert_eq!(ProfilerOptions::load_optional(&broken), ProfilerOptions::default());

        let good = ws.join("good.toml");
        std::fs::write(&good, "gap_threshold_seconds = 0.75").expect("write");
        assert_eq!(ProfilerOptions::load_optional(&good).gap_threshold_seconds, 0.75);
    }
}
