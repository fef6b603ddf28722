//! The per-request profiling session.
//!
//! A session starts inactive. [`ProfilingSession::activate`] flips it to
//! active exactly once; from then on checkpoints, queries and network calls
//! accumulate until [`ProfilingSession::finish`] synthesizes the report and
//! retires the session. Every recording call on an inactive or finished
//! session returns after a single atomic load.

use parking_lot::Mutex;
use time::OffsetDateTime;
use uuid::Uuid;

use std::panic::Location;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use crate::checkpoint::{NewCheckpoint, truncate_chars};
use crate::{
    CallOutcome, CallSite, CallToken, Checkpoint, CheckpointLog, Clock, LogSink, MemorySampler,
    NetworkCallRecord, NetworkCollector, ProcessMemory, ProfilerOptions, QueryCollector, QueryLog,
    QueryRecord, Report, ReportInput, RequestMetadata, SystemClock, fmt_secs, labels,
};

const INACTIVE: u8 = 0;
const ACTIVE: u8 = 1;
const FINISHED: u8 = 2;

pub struct ProfilingSession {
    options: ProfilerOptions,
    clock: Arc<dyn Clock>,
    memory: Arc<dyn MemorySampler>,
    phase: AtomicU8,
    state: Mutex<SessionState>,
}

struct SessionState {
    id: Uuid,
    start: Duration,
    wall_start: OffsetDateTime,
    metadata: RequestMetadata,
    checkpoints: CheckpointLog,
    queries: QueryCollector,
    network: NetworkCollector,
}

impl SessionState {
    fn empty() -> Self {
        Self {
            id: Uuid::nil(),
            start: Duration::ZERO,
            wall_start: OffsetDateTime::UNIX_EPOCH,
            metadata: RequestMetadata::default(),
            checkpoints: CheckpointLog::new(),
            queries: QueryCollector::new(),
            network: NetworkCollector::new(),
        }
    }

    /// Wall-clock time between the upstream arrival stamp and activation.
    /// Unknown without a stamp; a stamp from the future clamps to zero.
    fn queue_delay(&self) -> Option<Duration> {
        let received = self.metadata.received_at?;
        let delta = self.wall_start - received;
        Some(Duration::try_from(delta).unwrap_or(Duration::ZERO))
    }
}

impl std::fmt::Debug for ProfilingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfilingSession")
            .field("phase", &self.phase.load(Ordering::Relaxed))
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl ProfilingSession {
    /// Session on the system clock, sampling this process's memory.
    pub fn new(options: ProfilerOptions) -> Self {
        Self::with_sources(
            options,
            Arc::new(SystemClock::new()),
            Arc::new(ProcessMemory::new()),
        )
    }

    pub fn with_sources(
        options: ProfilerOptions,
        clock: Arc<dyn Clock>,
        memory: Arc<dyn MemorySampler>,
    ) -> Self {
        Self {
            options,
            clock,
            memory,
            phase: AtomicU8::new(INACTIVE),
            state: Mutex::new(SessionState::empty()),
        }
    }

    pub fn options(&self) -> &ProfilerOptions {
        &self.options
    }

    pub fn is_active(&self) -> bool {
        self.phase.load(Ordering::Acquire) == ACTIVE
    }

    pub fn is_finished(&self) -> bool {
        self.phase.load(Ordering::Acquire) == FINISHED
    }

    /// Starts profiling this request. Returns `false` if the session was
    /// already activated (or already finished); activation happens once.
    #[track_caller]
    pub fn activate(&self, metadata: RequestMetadata) -> bool {
        let caller = Location::caller();
        let start = self.clock.monotonic();
        let wall_start = self.clock.wall();
        {
            let mut state = self.state.lock();
            if self.phase.load(Ordering::Acquire) != INACTIVE {
                return false;
            }
            *state = SessionState {
                id: Uuid::new_v4(),
                start,
                wall_start,
                metadata,
                ..SessionState::empty()
            };
            self.phase.store(ACTIVE, Ordering::Release);
            tracing::debug!(
                session = %state.id,
                action = state.metadata.action.as_deref().unwrap_or("-"),
                "profiling session activated"
            );
        }
        self.record_at(
            labels::SESSION_START,
            "Profiling session started",
            CallSite::from_location(caller),
        );
        true
    }

    /// Appends a checkpoint attributed to the caller's location.
    #[track_caller]
    pub fn record(&self, label: &str, description: &str) {
        if !self.is_active() {
            return;
        }
        self.record_at(label, description, CallSite::from_location(Location::caller()));
    }

    /// Like [`record`](Self::record), naming the function that fired it.
    #[track_caller]
    pub fn record_from(&self, label: &str, description: &str, function: &str) {
        if !self.is_active() {
            return;
        }
        let site = CallSite::from_location(Location::caller()).with_function(function);
        self.record_at(label, description, site);
    }

    /// Appends a checkpoint with an explicit call site.
    pub fn record_at(&self, label: &str, description: &str, call_site: CallSite) {
        if !self.is_active() {
            return;
        }
        let now = self.clock.monotonic();
        let memory = self.memory.sample();
        let label = truncate_chars(label, self.options.label_limit);
        let mut state = self.state.lock();
        let at = now.saturating_sub(state.start);
        let queue_delay = state.queue_delay();
        state.checkpoints.push(NewCheckpoint {
            label,
            description: description.to_string(),
            at,
            queue_delay,
            memory,
            call_site,
        });
    }

    /// Registers an outbound call and returns its correlation token, or
    /// `None` when the session is not recording.
    #[track_caller]
    pub fn http_start(&self, url: &str, method: &str) -> Option<CallToken> {
        if !self.is_active() {
            return None;
        }
        let caller = Location::caller();
        let now = self.clock.monotonic();
        let (token, description) = {
            let mut state = self.state.lock();
            let at = now.saturating_sub(state.start);
            let call = state.network.start(url, method, at);
            (call.token.clone(), format!("{} {}", call.method, call.url))
        };
        self.record_at(labels::HTTP_START, &description, CallSite::from_location(caller));
        Some(token)
    }

    /// Resolves a call started with [`http_start`](Self::http_start).
    /// Unknown tokens are dropped silently.
    #[track_caller]
    pub fn http_end(&self, token: &CallToken, outcome: CallOutcome) {
        if !self.is_active() {
            return;
        }
        let caller = Location::caller();
        let now = self.clock.monotonic();
        let description = {
            let mut state = self.state.lock();
            let at = now.saturating_sub(state.start);
            let Some(call) = state.network.finish(token, outcome, at) else {
                tracing::debug!(%token, "completion for unknown or finished call ignored");
                return;
            };
            format!(
                "{} {} - {} ({})",
                call.method,
                call.url,
                fmt_secs(call.duration),
                call.status.as_str()
            )
        };
        self.record_at(labels::HTTP_END, &description, CallSite::from_location(caller));
    }

    /// Pulls the host's query log into the session. Missing or malformed
    /// logs are skipped.
    #[track_caller]
    pub fn collect_queries(&self, log: &QueryLog) {
        if !self.is_active() {
            return;
        }
        let caller = Location::caller();
        let collected = self.state.lock().queries.collect(log, &self.options);
        if let Some(count) = collected {
            self.record_at(
                labels::DB_QUERIES_COLLECTED,
                &format!("{count} queries"),
                CallSite::from_location(caller),
            );
        }
    }

    pub fn checkpoints(&self) -> Vec<Checkpoint> {
        self.state.lock().checkpoints.entries().to_vec()
    }

    pub fn queries(&self) -> Vec<QueryRecord> {
        self.state.lock().queries.records().to_vec()
    }

    pub fn network_calls(&self) -> Vec<NetworkCallRecord> {
        self.state.lock().network.calls().to_vec()
    }

    /// Identifier of the active request; `None` before activation.
    pub fn session_id(&self) -> Option<Uuid> {
        match self.phase.load(Ordering::Acquire) {
            INACTIVE => None,
            _ => Some(self.state.lock().id),
        }
    }

    /// Ends the session and synthesizes its report. Only the first call on
    /// an active session yields a report; the accumulated state is dropped.
    pub fn finish(&self) -> Option<Report> {
        let now = self.clock.monotonic();
        let memory = self.memory.sample();
        let state = {
            let mut guard = self.state.lock();
            if self
                .phase
                .compare_exchange(ACTIVE, FINISHED, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return None;
            }
            std::mem::replace(&mut *guard, SessionState::empty())
        };
        let queue_delay = state.queue_delay();
        let mut queries = state.queries;
        let mut network = state.network;
        let checkpoints = state.checkpoints.into_entries();
        let peak_memory = checkpoints
            .iter()
            .map(|c| c.peak_memory_usage)
            .fold(memory.peak, u64::max);
        let input = ReportInput {
            session_id: state.id,
            metadata: state.metadata,
            started_at: state.wall_start,
            total: now.saturating_sub(state.start),
            queue_delay,
            peak_memory,
            checkpoints,
            queries: queries.take(),
            network_calls: network.take(),
        };
        tracing::debug!(
            session = %input.session_id,
            checkpoints = input.checkpoints.len(),
            "profiling session finished"
        );
        Some(Report::synthesize(input, &self.options))
    }

    /// [`finish`](Self::finish), then writes the rendered report to `sink`.
    pub fn finish_into(&self, sink: &dyn LogSink) -> Option<Report> {
        let report = self.finish()?;
        report.emit(sink);
        Some(report)
    }
}
