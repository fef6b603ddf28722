//! End-of-request report synthesis.
//!
//! [`Report::synthesize`] turns the finished checkpoint log and collector
//! data into ranked, deterministic sections. Text rendering lives in
//! `render.rs`; this module only computes.

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use std::collections::HashMap;
use std::time::Duration;

use crate::checkpoint::first_labelled;
use crate::{
    CallSite, CallStatus, Checkpoint, NetworkCallRecord, ProfilerOptions, QueryRecord,
    RequestMetadata, fmt_secs,
};

/// Everything the synthesizer needs, detached from the live session.
#[derive(Debug, Clone)]
pub struct ReportInput {
    pub session_id: Uuid,
    pub metadata: RequestMetadata,
    pub started_at: OffsetDateTime,
    pub total: Duration,
    pub queue_delay: Option<Duration>,
    pub peak_memory: u64,
    pub checkpoints: Vec<Checkpoint>,
    pub queries: Vec<QueryRecord>,
    pub network_calls: Vec<NetworkCallRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub header: ReportHeader,
    pub thresholds: Thresholds,
    pub slow_operations: Vec<SlowOperation>,
    pub timeline: Vec<TimelineEntry>,
    pub gaps: Vec<Gap>,
    pub queries: QuerySummary,
    pub network: NetworkSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<TimeBreakdown>,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportHeader {
    pub session_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(serialize_with = "crate::duration::serialize_secs")]
    pub total_elapsed: Duration,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "crate::duration::serialize_opt_secs"
    )]
    pub total_with_queue: Option<Duration>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "crate::duration::serialize_opt_secs"
    )]
    pub queue_delay: Option<Duration>,
    pub peak_memory: u64,
    pub checkpoint_count: usize,
    pub query_count: usize,
    pub network_call_count: usize,
    pub request: RequestMetadata,
}

/// The thresholds a report was produced with, so its text is self-describing.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Thresholds {
    pub slow_seconds: f64,
    pub very_slow_seconds: f64,
    pub gap_seconds: f64,
    pub timeline_noise_seconds: f64,
    pub query_backtrace_seconds: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlowSeverity {
    Slow,
    VerySlow,
}

impl SlowSeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Slow => "SLOW",
            Self::VerySlow => "VERY SLOW",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SlowOperation {
    pub rank: usize,
    pub checkpoint: usize,
    pub label: String,
    #[serde(serialize_with = "crate::duration::serialize_secs")]
    pub elapsed: Duration,
    pub severity: SlowSeverity,
    pub call_site: CallSite,
    pub memory: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimelineEntry {
    pub index: usize,
    pub label: String,
    pub description: String,
    #[serde(serialize_with = "crate::duration::serialize_secs")]
    pub at: Duration,
    #[serde(serialize_with = "crate::duration::serialize_secs")]
    pub delta: Duration,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "crate::duration::serialize_opt_secs"
    )]
    pub since_external: Option<Duration>,
    pub percent_of_total: f64,
    pub memory: u64,
    pub call_site: CallSite,
    /// False when the delta is within the noise threshold.
    pub significant: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Gap {
    pub from_index: usize,
    pub from_label: String,
    pub to_index: usize,
    pub to_label: String,
    #[serde(serialize_with = "crate::duration::serialize_secs")]
    pub gap: Duration,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct QuerySummary {
    pub count: usize,
    #[serde(serialize_with = "crate::duration::serialize_secs")]
    pub total: Duration,
    pub percent_of_total: f64,
    pub top: Vec<QueryRecord>,
    /// Statements issued more than once, in first-seen order.
    pub repeated: Vec<RepeatedQuery>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RepeatedQuery {
    pub fingerprint: String,
    pub text: String,
    pub count: usize,
    #[serde(serialize_with = "crate::duration::serialize_secs")]
    pub total: Duration,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct NetworkSummary {
    pub count: usize,
    #[serde(serialize_with = "crate::duration::serialize_secs")]
    pub total: Duration,
    pub percent_of_total: f64,
    pub pending: usize,
    pub errors: usize,
    pub top: Vec<NetworkCallRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimeBreakdown {
    #[serde(serialize_with = "crate::duration::serialize_secs")]
    pub total: Duration,
    #[serde(serialize_with = "crate::duration::serialize_secs")]
    pub queries: Duration,
    #[serde(serialize_with = "crate::duration::serialize_secs")]
    pub network: Duration,
    #[serde(serialize_with = "crate::duration::serialize_secs")]
    pub other: Duration,
    pub queries_percent: f64,
    pub network_percent: f64,
    pub other_percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Issue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    SlowToLateCheckpoint,
    SlowAfterCheckpoint,
    SlowToInit,
    HighQueryCount,
    HighQueueingDelay,
    SlowExecution,
    Overall,
}

#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub severity: Severity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

/// `part / total` as a percentage; zero when the denominator is zero or the
/// result would not be finite.
pub fn percent_of(part: Duration, total: Duration) -> f64 {
    let denom = total.as_secs_f64();
    if denom <= 0.0 {
        return 0.0;
    }
    let pct = part.as_secs_f64() / denom * 100.0;
    if pct.is_finite() { pct } else { 0.0 }
}

impl Report {
    pub fn synthesize(input: ReportInput, options: &ProfilerOptions) -> Self {
        let ReportInput {
            session_id,
            metadata,
            started_at,
            total,
            queue_delay,
            peak_memory,
            checkpoints,
            queries,
            network_calls,
        } = input;

        let header = ReportHeader {
            session_id,
            started_at,
            total_elapsed: total,
            total_with_queue: queue_delay.map(|q| q.saturating_add(total)),
            queue_delay,
            peak_memory,
            checkpoint_count: checkpoints.len(),
            query_count: queries.len(),
            network_call_count: network_calls.len(),
            request: metadata,
        };
        let thresholds = Thresholds {
            slow_seconds: options.slow_threshold_seconds,
            very_slow_seconds: options.very_slow_threshold_seconds,
            gap_seconds: options.gap_threshold_seconds,
            timeline_noise_seconds: options.timeline_noise_seconds,
            query_backtrace_seconds: options.query_backtrace_threshold_seconds,
        };

        if checkpoints.is_empty() {
            return Self {
                header,
                thresholds,
                slow_operations: Vec::new(),
                timeline: Vec::new(),
                gaps: Vec::new(),
                queries: QuerySummary::default(),
                network: NetworkSummary::default(),
                breakdown: None,
                diagnostics: Vec::new(),
            };
        }

        let query_summary = summarize_queries(&queries, total, options.top_n_queries);
        let network_summary = summarize_network(&network_calls, total, options.top_n_network_calls);
        let breakdown = breakdown(total, query_summary.total, network_summary.total);
        let diagnostics = diagnose(&header, &checkpoints, options);

        Self {
            slow_operations: slow_operations(&checkpoints, options),
            timeline: timeline(&checkpoints, total, options.timeline_noise_seconds),
            gaps: find_gaps(&checkpoints, options.gap_threshold_seconds),
            queries: query_summary,
            network: network_summary,
            breakdown: Some(breakdown),
            diagnostics,
            header,
            thresholds,
        }
    }

    /// Only the header carries data; nothing was recorded.
    pub fn is_header_only(&self) -> bool {
        self.timeline.is_empty()
    }

    /// The structured form: section name to section data.
    pub fn to_json(&self) -> crate::ProfilerResult<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn diagnostic(&self, kind: DiagnosticKind) -> Option<&Diagnostic> {
        self.diagnostics.iter().find(|d| d.kind == kind)
    }

    /// Response headers exposing the headline timings to a browser.
    /// Queue time is only present when the arrival stamp was known.
    pub fn timing_headers(&self) -> Vec<(&'static str, String)> {
        let h = &self.header;
        let mut headers = vec![("X-Profiler-Exec-Time", fmt_secs(h.total_elapsed))];
        if let (Some(queue), Some(total)) = (h.queue_delay, h.total_with_queue) {
            headers.push(("X-Profiler-Total-Time", fmt_secs(total)));
            headers.push(("X-Profiler-Queue-Time", fmt_secs(queue)));
        }
        headers.push(("X-Profiler-Memory", crate::format_bytes(h.peak_memory)));
        headers
    }
}

fn slow_operations(checkpoints: &[Checkpoint], options: &ProfilerOptions) -> Vec<SlowOperation> {
    let mut slow: Vec<&Checkpoint> = checkpoints
        .iter()
        .filter(|c| c.elapsed_since_last.as_secs_f64() > options.slow_threshold_seconds)
        .collect();
    slow.sort_by(|a, b| b.elapsed_since_last.cmp(&a.elapsed_since_last));
    slow.into_iter()
        .enumerate()
        .map(|(i, c)| SlowOperation {
            rank: i + 1,
            checkpoint: c.index,
            label: c.label.clone(),
            elapsed: c.elapsed_since_last,
            severity: if c.elapsed_since_last.as_secs_f64() > options.very_slow_threshold_seconds {
                SlowSeverity::VerySlow
            } else {
                SlowSeverity::Slow
            },
            call_site: c.call_site.clone(),
            memory: c.memory_usage,
        })
        .collect()
}

fn timeline(checkpoints: &[Checkpoint], total: Duration, noise_seconds: f64) -> Vec<TimelineEntry> {
    checkpoints
        .iter()
        .map(|c| TimelineEntry {
            index: c.index,
            label: c.label.clone(),
            description: c.description.clone(),
            at: c.at,
            delta: c.elapsed_since_last,
            since_external: c.elapsed_since_external,
            percent_of_total: percent_of(c.at, total),
            memory: c.memory_usage,
            call_site: c.call_site.clone(),
            significant: c.elapsed_since_last.as_secs_f64() > noise_seconds,
        })
        .collect()
}

fn find_gaps(checkpoints: &[Checkpoint], gap_seconds: f64) -> Vec<Gap> {
    checkpoints
        .windows(2)
        .filter_map(|pair| {
            let (prev, next) = (&pair[0], &pair[1]);
            let gap = next.at.saturating_sub(prev.at);
            (gap.as_secs_f64() > gap_seconds).then(|| Gap {
                from_index: prev.index,
                from_label: prev.label.clone(),
                to_index: next.index,
                to_label: next.label.clone(),
                gap,
            })
        })
        .collect()
}

fn summarize_queries(queries: &[QueryRecord], total: Duration, top_n: usize) -> QuerySummary {
    let total_time: Duration = queries.iter().map(|q| q.duration).sum();

    let mut top: Vec<QueryRecord> = queries.to_vec();
    top.sort_by(|a, b| b.duration.cmp(&a.duration));
    top.truncate(top_n);

    let mut order: Vec<&str> = Vec::new();
    let mut groups: HashMap<&str, RepeatedQuery> = HashMap::new();
    for q in queries {
        let entry = groups.entry(q.fingerprint.as_str()).or_insert_with(|| {
            order.push(q.fingerprint.as_str());
            RepeatedQuery {
                fingerprint: q.fingerprint.clone(),
                text: q.text.clone(),
                count: 0,
                total: Duration::ZERO,
            }
        });
        entry.count += 1;
        entry.total = entry.total.saturating_add(q.duration);
    }
    let repeated = order
        .into_iter()
        .filter_map(|fp| groups.remove(fp))
        .filter(|g| g.count > 1)
        .collect();

    QuerySummary {
        count: queries.len(),
        total: total_time,
        percent_of_total: percent_of(total_time, total),
        top,
        repeated,
    }
}

fn summarize_network(calls: &[NetworkCallRecord], total: Duration, top_n: usize) -> NetworkSummary {
    let total_time: Duration = calls.iter().map(|c| c.duration).sum();
    let mut top: Vec<NetworkCallRecord> = calls.to_vec();
    top.sort_by(|a, b| b.duration.cmp(&a.duration));
    top.truncate(top_n);
    NetworkSummary {
        count: calls.len(),
        total: total_time,
        percent_of_total: percent_of(total_time, total),
        pending: calls.iter().filter(|c| c.status == CallStatus::Pending).count(),
        errors: calls.iter().filter(|c| c.status == CallStatus::Error).count(),
        top,
    }
}

fn breakdown(total: Duration, queries: Duration, network: Duration) -> TimeBreakdown {
    // Collector timings come from the host and can overlap or outrun the
    // session clock; the remainder never goes negative.
    let other = total.saturating_sub(queries).saturating_sub(network);
    TimeBreakdown {
        total,
        queries,
        network,
        other,
        queries_percent: percent_of(queries, total),
        network_percent: percent_of(network, total),
        other_percent: percent_of(other, total),
    }
}

fn diagnose(
    header: &ReportHeader,
    checkpoints: &[Checkpoint],
    options: &ProfilerOptions,
) -> Vec<Diagnostic> {
    let h = &options.heuristics;
    let mut out = Vec::new();

    if let Some(cp) = first_labelled(checkpoints, h.init_label.as_str())
        && cp.at.as_secs_f64() > h.init_seconds
    {
        out.push(Diagnostic {
            kind: DiagnosticKind::SlowToInit,
            severity: Severity::Warning,
            message: format!("Taking {} to reach {}", fmt_secs(cp.at), cp.label),
            hint: Some("Suggests slow plugin loading or server issues".to_string()),
        });
    }

    if let Some(cp) = first_labelled(checkpoints, h.late_checkpoint_label.as_str())
        && cp.at.as_secs_f64() > h.late_checkpoint_seconds
    {
        out.push(Diagnostic {
            kind: DiagnosticKind::SlowToLateCheckpoint,
            severity: Severity::Warning,
            message: format!("Taking {} to reach {}", fmt_secs(cp.at), cp.label),
            hint: Some("Time is spent before the request's own work begins".to_string()),
        });
    }

    if let Some(cp) = first_labelled(checkpoints, h.after_checkpoint_label.as_str()) {
        let after = header.total_elapsed.saturating_sub(cp.at);
        if after.as_secs_f64() > h.after_checkpoint_seconds {
            out.push(Diagnostic {
                kind: DiagnosticKind::SlowAfterCheckpoint,
                severity: Severity::Warning,
                message: format!("{} spent after {}", fmt_secs(after), cp.label),
                hint: Some("Check email sending, webhooks and API calls".to_string()),
            });
        }
    }

    if header.query_count > h.max_queries {
        out.push(Diagnostic {
            kind: DiagnosticKind::HighQueryCount,
            severity: Severity::Warning,
            message: format!("High number of database queries: {}", header.query_count),
            hint: None,
        });
    }

    if let Some(queue) = header.queue_delay
        && queue.as_secs_f64() > h.queue_seconds
    {
        out.push(Diagnostic {
            kind: DiagnosticKind::HighQueueingDelay,
            severity: Severity::Warning,
            message: format!("High server queueing delay: {}", fmt_secs(queue)),
            hint: Some("Possible server load".to_string()),
        });
    }

    let overall = header.total_with_queue.unwrap_or(header.total_elapsed);
    let overall_secs = overall.as_secs_f64();
    if overall_secs > h.overall_issue_seconds {
        if header.total_elapsed.as_secs_f64() > h.execution_issue_seconds {
            out.push(Diagnostic {
                kind: DiagnosticKind::SlowExecution,
                severity: Severity::Issue,
                message: format!("Slow execution: {}", fmt_secs(header.total_elapsed)),
                hint: Some("Code optimization needed".to_string()),
            });
        }
        out.push(Diagnostic {
            kind: DiagnosticKind::Overall,
            severity: Severity::Issue,
            message: format!(
                "Total time {} is over {}s",
                fmt_secs(overall),
                h.overall_issue_seconds
            ),
            hint: None,
        });
    } else if overall_secs > h.overall_warning_seconds {
        out.push(Diagnostic {
            kind: DiagnosticKind::Overall,
            severity: Severity::Warning,
            message: format!(
                "Total time {} is between {}s and {}s",
                fmt_secs(overall),
                h.overall_warning_seconds,
                h.overall_issue_seconds
            ),
            hint: None,
        });
    } else {
        out.push(Diagnostic {
            kind: DiagnosticKind::Overall,
            severity: Severity::Info,
            message: format!(
                "Total time {} is under {}s",
                fmt_secs(overall),
                h.overall_warning_seconds
            ),
            hint: None,
        });
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::NewCheckpoint;
    use crate::{CallToken, CheckpointLog, MemorySnapshot};

    fn checkpoints_at(points: &[(&str, f64)]) -> Vec<Checkpoint> {
        let mut log = CheckpointLog::new();
        for (label, secs) in points {
            log.push(NewCheckpoint {
                label: label.to_string(),
                description: String::new(),
                at: Duration::from_secs_f64(*secs),
                queue_delay: None,
                memory: MemorySnapshot::default(),
                call_site: CallSite::unknown(),
            });
        }
        log.into_entries()
    }

    fn input(checkpoints: Vec<Checkpoint>, total: Duration) -> ReportInput {
        ReportInput {
            session_id: Uuid::nil(),
            metadata: RequestMetadata::default(),
            started_at: OffsetDateTime::UNIX_EPOCH,
            total,
            queue_delay: None,
            peak_memory: 0,
            checkpoints,
            queries: Vec::new(),
            network_calls: Vec::new(),
        }
    }

    fn query(text: &str, ms: u64) -> QueryRecord {
        QueryRecord {
            text: text.to_string(),
            duration: Duration::from_millis(ms),
            fingerprint: blake3::hash(text.as_bytes()).to_hex().to_string(),
            call_site: CallSite::unknown(),
        }
    }

    fn call(url: &str, ms: u64, status: CallStatus) -> NetworkCallRecord {
        NetworkCallRecord {
            token: CallToken::from(url),
            url: url.to_string(),
            method: "GET".to_string(),
            started_at: Duration::ZERO,
            duration: Duration::from_millis(ms),
            status,
            status_code: None,
            error: None,
        }
    }

    #[test]
    fn zero_checkpoints_give_header_only_report() {
        let report = Report::synthesize(input(Vec::new(), Duration::ZERO), &ProfilerOptions::default());
        assert!(report.is_header_only());
        assert!(report.slow_operations.is_empty());
        assert!(report.gaps.is_empty());
        assert!(report.diagnostics.is_empty());
        assert!(report.breakdown.is_none());
        assert_eq!(report.header.checkpoint_count, 0);
        assert_eq!(report.header.queue_delay, None);
        let names: Vec<&str> = report.timing_headers().into_iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["X-Profiler-Exec-Time", "X-Profiler-Memory"]);
    }

    #[test]
    fn slow_operations_rank_descending_with_severity() {
        // deltas 0.05, 0.3, 1.5, 0.02
        let cps = checkpoints_at(&[("a", 0.05), ("b", 0.35), ("c", 1.85), ("d", 1.87)]);
        let report = Report::synthesize(input(cps, Duration::from_secs_f64(1.87)), &ProfilerOptions::default());
        let ranked: Vec<(&str, SlowSeverity, usize)> = report
            .slow_operations
            .iter()
            .map(|s| (s.label.as_str(), s.severity, s.rank))
            .collect();
        assert_eq!(
            ranked,
            vec![("c", SlowSeverity::VerySlow, 1), ("b", SlowSeverity::Slow, 2)]
        );
        assert!((report.slow_operations[0].elapsed.as_secs_f64() - 1.5).abs() < 1e-9);
        assert!((report.slow_operations[1].elapsed.as_secs_f64() - 0.3).abs() < 1e-9);
    }

    #[test]
    fn gaps_flag_only_intervals_over_threshold() {
        let cps = checkpoints_at(&[("a", 0.0), ("b", 0.2), ("c", 0.9), ("d", 1.0)]);
        let report = Report::synthesize(input(cps, Duration::from_secs(1)), &ProfilerOptions::default());
        assert_eq!(report.gaps.len(), 1);
        let gap = &report.gaps[0];
        assert_eq!((gap.from_label.as_str(), gap.to_label.as_str()), ("b", "c"));
        assert!((gap.gap.as_secs_f64() - 0.7).abs() < 1e-9);
    }

    #[test]
    fn zero_total_yields_zero_percentages() {
        let cps = checkpoints_at(&[("a", 0.0), ("b", 0.0)]);
        let mut inp = input(cps, Duration::ZERO);
        inp.queries = vec![query("SELECT 1", 5)];
        inp.network_calls = vec![call("https://a", 7, CallStatus::Success)];
        let report = Report::synthesize(inp, &ProfilerOptions::default());
        assert!(report.timeline.iter().all(|t| t.percent_of_total == 0.0));
        assert_eq!(report.queries.percent_of_total, 0.0);
        assert_eq!(report.network.percent_of_total, 0.0);
        let b = report.breakdown.expect("breakdown");
        assert_eq!((b.queries_percent, b.network_percent, b.other_percent), (0.0, 0.0, 0.0));
        assert_eq!(percent_of(Duration::from_secs(1), Duration::ZERO), 0.0);
    }

    #[test]
    fn other_time_clamps_when_collectors_exceed_total() {
        let cps = checkpoints_at(&[("a", 0.0), ("b", 0.5)]);
        let mut inp = input(cps, Duration::from_millis(500));
        inp.queries = vec![query("SELECT 1", 400)];
        inp.network_calls = vec![call("https://a", 300, CallStatus::Success)];
        let report = Report::synthesize(inp, &ProfilerOptions::default());
        let b = report.breakdown.expect("breakdown");
        assert_eq!(b.other, Duration::ZERO);
        assert_eq!(b.other_percent, 0.0);
        assert!((b.queries_percent - 80.0).abs() < 1e-9);
    }

    #[test]
    fn top_n_is_stable_and_repeated_queries_group() {
        let cps = checkpoints_at(&[("a", 0.0)]);
        let mut inp = input(cps, Duration::from_secs(1));
        inp.queries = vec![
            query("SELECT a", 10),
            query("SELECT b", 30),
            query("SELECT c", 10),
            query("SELECT a", 20),
        ];
        inp.network_calls = vec![
            call("https://one", 50, CallStatus::Success),
            call("https://two", 50, CallStatus::Error),
            call("https://three", 0, CallStatus::Pending),
        ];
        let options = ProfilerOptions {
            top_n_queries: 3,
            top_n_network_calls: 2,
            ..ProfilerOptions::default()
        };
        let report = Report::synthesize(inp, &options);
        let top: Vec<&str> = report.queries.top.iter().map(|q| q.text.as_str()).collect();
        assert_eq!(top, vec!["SELECT b", "SELECT a", "SELECT a"]);
        assert_eq!(report.queries.total, Duration::from_millis(70));
        assert_eq!(report.queries.repeated.len(), 1);
        assert_eq!(report.queries.repeated[0].count, 2);
        assert_eq!(report.queries.repeated[0].total, Duration::from_millis(30));

        let urls: Vec<&str> = report.network.top.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(urls, vec!["https://one", "https://two"]);
        assert_eq!((report.network.pending, report.network.errors), (1, 1));
    }

    #[test]
    fn diagnostics_skip_missing_checkpoints() {
        let cps = checkpoints_at(&[("SESSION_START", 0.0), ("X", 5.0)]);
        let report = Report::synthesize(input(cps, Duration::from_secs(5)), &ProfilerOptions::default());
        assert!(report.diagnostic(DiagnosticKind::SlowToLateCheckpoint).is_none());
        assert!(report.diagnostic(DiagnosticKind::SlowAfterCheckpoint).is_none());
        assert!(report.diagnostic(DiagnosticKind::SlowToInit).is_none());
        let overall = report.diagnostic(DiagnosticKind::Overall).expect("overall");
        assert_eq!(overall.severity, Severity::Issue);
        assert!(report.diagnostic(DiagnosticKind::SlowExecution).is_some());
    }

    #[test]
    fn diagnostics_trigger_on_thresholds() {
        let cps = checkpoints_at(&[("INIT", 1.2), ("BEFORE_ACTIONS", 1.3), ("END", 3.5)]);
        let mut inp = input(cps, Duration::from_secs_f64(3.5));
        inp.queries = (0..101).map(|i| query(&format!("SELECT {i}"), 0)).collect();
        inp.queue_delay = Some(Duration::from_millis(1500));
        let report = Report::synthesize(inp, &ProfilerOptions::default());
        for kind in [
            DiagnosticKind::SlowToInit,
            DiagnosticKind::SlowToLateCheckpoint,
            DiagnosticKind::SlowAfterCheckpoint,
            DiagnosticKind::HighQueryCount,
            DiagnosticKind::HighQueueingDelay,
        ] {
            assert!(report.diagnostic(kind).is_some(), "missing {kind:?}");
        }
        assert_eq!(
            report.diagnostics.last().map(|d| d.kind),
            Some(DiagnosticKind::Overall)
        );
    }

    #[test]
    fn structured_record_has_every_section() {
        let cps = checkpoints_at(&[("a", 0.0), ("b", 0.25)]);
        let report = Report::synthesize(input(cps, Duration::from_millis(250)), &ProfilerOptions::default());
        let json = report.to_json().expect("json");
        for section in [
            "header",
            "thresholds",
            "slow_operations",
            "timeline",
            "gaps",
            "queries",
            "network",
            "breakdown",
            "diagnostics",
        ] {
            assert!(json.get(section).is_some(), "missing section {section}");
        }
        assert_eq!(json["timeline"][1]["delta"].as_f64(), Some(0.25));
        assert!(json["header"].get("queue_delay").is_none());
    }
}
