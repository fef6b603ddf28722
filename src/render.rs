//! Plain-text rendering of a [`Report`], one line per sink call.

use crate::{
    Diagnostic, LogSink, Report, Severity, SlowSeverity, fmt_secs, format_bytes,
};

const RULE: &str = "==========================================================";
const SECTION_RULE: &str = "----------------------------------------------------------";

impl Report {
    pub fn render_text(&self) -> Vec<String> {
        let mut out = Lines::default();
        self.render_header(&mut out);
        if self.is_header_only() {
            out.push("No checkpoints recorded.");
            out.push(RULE);
            return out.0;
        }
        self.render_slow(&mut out);
        self.render_timeline(&mut out);
        self.render_gaps(&mut out);
        self.render_queries(&mut out);
        self.render_network(&mut out);
        self.render_breakdown(&mut out);
        self.render_diagnostics(&mut out);
        out.push(RULE);
        out.0
    }

    /// Writes every rendered line to `sink`, in order.
    pub fn emit(&self, sink: &dyn LogSink) {
        for line in self.render_text() {
            sink.line(&line);
        }
    }

    fn render_header(&self, out: &mut Lines) {
        let h = &self.header;
        out.push(RULE);
        out.push(format!("REQUEST PROFILE {}", h.session_id));
        out.push(RULE);
        out.push(format!("started        {}", h.started_at));
        out.push(format!("total          {}", fmt_secs(h.total_elapsed)));
        match (h.queue_delay, h.total_with_queue) {
            (Some(queue), Some(with_queue)) => {
                out.push(format!("queueing       {}", fmt_secs(queue)));
                out.push(format!("with queueing  {}", fmt_secs(with_queue)));
            }
            _ => out.push("queueing       not available"),
        }
        out.push(format!("peak memory    {}", format_bytes(h.peak_memory)));
        out.push(format!(
            "counts         checkpoints={} queries={} network_calls={}",
            h.checkpoint_count, h.query_count, h.network_call_count
        ));
        for (key, value) in h.request.describe() {
            out.push(format!("request        {key}={value}"));
        }
    }

    fn render_slow(&self, out: &mut Lines) {
        out.section(format!(
            "SLOW OPERATIONS (> {}s)",
            self.thresholds.slow_seconds
        ));
        if self.slow_operations.is_empty() {
            out.push("none");
            return;
        }
        for op in &self.slow_operations {
            let marker = match op.severity {
                SlowSeverity::VerySlow => "!!",
                SlowSeverity::Slow => "! ",
            };
            out.push(format!(
                "{marker} #{} {} {} [{}] at {} mem {}",
                op.rank,
                fmt_secs(op.elapsed),
                op.label,
                op.severity.as_str(),
                op.call_site,
                format_bytes(op.memory)
            ));
        }
    }

    fn render_timeline(&self, out: &mut Lines) {
        out.section("TIMELINE");
        let mut hidden = 0usize;
        for entry in &self.timeline {
            if !entry.significant && entry.index != 0 {
                hidden += 1;
                continue;
            }
            let external = entry
                .since_external
                .map(|d| format!(" ext {}", fmt_secs(d)))
                .unwrap_or_default();
            let description = if entry.description.is_empty() {
                String::new()
            } else {
                format!(": {}", entry.description)
            };
            out.push(format!(
                "[{:>3}] {} (+{}) {:>6.2}%{external} {}{description} @ {} mem {}",
                entry.index,
                fmt_secs(entry.at),
                fmt_secs(entry.delta),
                entry.percent_of_total,
                entry.label,
                entry.call_site,
                format_bytes(entry.memory)
            ));
        }
        if hidden > 0 {
            out.push(format!(
                "({hidden} checkpoints under {}s hidden)",
                self.thresholds.timeline_noise_seconds
            ));
        }
    }

    fn render_gaps(&self, out: &mut Lines) {
        out.section(format!("GAPS (> {}s)", self.thresholds.gap_seconds));
        if self.gaps.is_empty() {
            out.push("none");
            return;
        }
        for gap in &self.gaps {
            out.push(format!(
                "{} between [{}] {} and [{}] {}",
                fmt_secs(gap.gap),
                gap.from_index,
                gap.from_label,
                gap.to_index,
                gap.to_label
            ));
        }
    }

    fn render_queries(&self, out: &mut Lines) {
        let q = &self.queries;
        out.section("DATABASE QUERIES");
        out.push(format!(
            "count={} total={} ({:.1}% of request)",
            q.count,
            fmt_secs(q.total),
            q.percent_of_total
        ));
        for (i, query) in q.top.iter().enumerate() {
            out.push(format!("{:>2}. {} {}", i + 1, fmt_secs(query.duration), query.text));
            if query.duration.as_secs_f64() > self.thresholds.query_backtrace_seconds {
                out.push(format!("    from {}", query.call_site));
            }
        }
        for repeated in &q.repeated {
            out.push(format!(
                "repeated x{} ({}) {}",
                repeated.count,
                fmt_secs(repeated.total),
                repeated.text
            ));
        }
    }

    fn render_network(&self, out: &mut Lines) {
        let n = &self.network;
        out.section("NETWORK CALLS");
        out.push(format!(
            "count={} total={} ({:.1}% of request) pending={} errors={}",
            n.count,
            fmt_secs(n.total),
            n.percent_of_total,
            n.pending,
            n.errors
        ));
        for (i, call) in n.top.iter().enumerate() {
            let detail = match (&call.error, call.status_code) {
                (Some(err), _) => format!(" ({err})"),
                (None, Some(code)) => format!(" ({code})"),
                (None, None) => String::new(),
            };
            out.push(format!(
                "{:>2}. {} {} {} [{}]{detail}",
                i + 1,
                fmt_secs(call.duration),
                call.method,
                call.url,
                call.status.as_str()
            ));
        }
    }

    fn render_breakdown(&self, out: &mut Lines) {
        let Some(b) = &self.breakdown else {
            return;
        };
        out.section("TIME BREAKDOWN");
        out.push(format!("queries  {} ({:.1}%)", fmt_secs(b.queries), b.queries_percent));
        out.push(format!("network  {} ({:.1}%)", fmt_secs(b.network), b.network_percent));
        out.push(format!("other    {} ({:.1}%)", fmt_secs(b.other), b.other_percent));
    }

    fn render_diagnostics(&self, out: &mut Lines) {
        out.section("DIAGNOSTICS");
        for diagnostic in &self.diagnostics {
            out.push(diagnostic_line(diagnostic));
            if let Some(hint) = &diagnostic.hint {
                out.push(format!("         {hint}"));
            }
        }
    }
}

fn diagnostic_line(d: &Diagnostic) -> String {
    let tag = match d.severity {
        Severity::Info => "[ok]   ",
        Severity::Warning => "[warn] ",
        Severity::Issue => "[issue]",
    };
    format!("{tag}  {}", d.message)
}

#[derive(Default)]
struct Lines(Vec<String>);

impl Lines {
    fn push(&mut self, line: impl Into<String>) {
        self.0.push(line.into());
    }

    fn section(&mut self, title: impl Into<String>) {
        self.0.push(SECTION_RULE.to_string());
        self.0.push(title.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{FixedMemory, ManualClock};
    use crate::{
        Backtrace, CallOutcome, Frame, MemorySink, ProfilerOptions, ProfilingSession, QueryLog,
        RawQuery, RequestMetadata,
    };

    use std::sync::Arc;
    use std::time::Duration;

    fn session() -> (ProfilingSession, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let memory = Arc::new(FixedMemory::new(2 * 1024 * 1024));
        let session =
            ProfilingSession::with_sources(ProfilerOptions::default(), clock.clone(), memory);
        (session, clock)
    }

    #[test]
    fn never_activated_emits_nothing() {
        let (session, _) = session();
        let sink = MemorySink::new();
        assert!(session.finish_into(&sink).is_none());
        assert!(sink.lines().is_empty());
    }

    #[test]
    fn text_hides_noise_and_marks_slow_rows() {
        let (session, clock) = session();
        session.activate(RequestMetadata::for_action("form_submit"));
        clock.advance(Duration::from_millis(2));
        session.record("TINY", "");
        clock.advance(Duration::from_millis(1200));
        session.record("HEAVY", "mail");
        let token = session.http_start("https://hooks.example.com", "post").expect("active");
        clock.advance(Duration::from_millis(300));
        session.http_end(&token, CallOutcome::error("timeout"));

        let sink = MemorySink::new();
        let report = session.finish_into(&sink).expect("report");
        let lines = sink.lines();
        assert_eq!(lines, report.render_text());
        assert!(sink.contains("REQUEST PROFILE"));
        assert!(sink.contains("queueing       not available"));
        assert!(sink.contains("request        action=form_submit"));
        assert!(sink.contains("!! #1 1.2000s HEAVY [VERY SLOW]"));
        assert!(sink.contains("(2 checkpoints under 0.01s hidden)"));
        assert!(!lines.iter().any(|l| l.contains(" TINY")));
        assert!(sink.contains("[error] (timeout)"));
        assert!(sink.contains("pending=0 errors=1"));
        assert!(sink.contains("GAPS (> 0.5s)"));
        assert_eq!(lines.last().map(String::as_str), Some(RULE));
    }

    #[test]
    fn slow_queries_print_their_application_caller() {
        let (session, clock) = session();
        session.activate(RequestMetadata::for_action("form_submit"));
        clock.advance(Duration::from_millis(400));

        let mut frames: Vec<Frame> = [
            "wp-db.php",
            "class-wp-hook.php",
            "plugin.php",
            "admin-ajax.php",
            "load.php",
            "functions.php",
        ]
        .into_iter()
        .map(|file| Frame {
            file: Some(format!("/srv/wp-includes/{file}")),
            class: Some("wpdb".to_string()),
            function: Some("query".to_string()),
            ..Frame::default()
        })
        .collect();
        frames.push(Frame {
            file: Some("/srv/wp-content/plugins/forms/app/Submit.php".to_string()),
            class: Some("Submit".to_string()),
            function: Some("store".to_string()),
            ..Frame::default()
        });
        session.collect_queries(&QueryLog::Entries(vec![
            RawQuery::new("INSERT INTO submissions", Duration::from_millis(250))
                .with_backtrace(Backtrace::Frames(frames)),
            RawQuery::new("SELECT 1", Duration::from_millis(20)),
        ]));

        let sink = MemorySink::new();
        session.finish_into(&sink).expect("report");
        let lines = sink.lines();
        let row = lines
            .iter()
            .position(|l| l.ends_with("0.2500s INSERT INTO submissions"))
            .expect("slow query row");
        assert_eq!(lines[row + 1], "    from Submit::store");
        let fast = lines
            .iter()
            .position(|l| l.ends_with("0.0200s SELECT 1"))
            .expect("fast query row");
        assert!(!lines[fast + 1].starts_with("    from"));
    }
}
