//! Scenario files: a small deterministic step DSL that replays one request
//! against a session on a manual clock.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

use crate::{
    Backtrace, CallOutcome, CallToken, Clock, FixedMemory, Frame, HookRegistry,
    LifecycleBinder, ManualClock, MemorySink, Payload, ProfilerError, ProfilerOptions,
    ProfilerResult, ProfilingSession, QueryLog, RawQuery, Report, RequestMetadata,
    DEFAULT_SHUTDOWN_HOOK, parse_duration,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioFile {
    pub version: u32,
    pub name: String,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Step {
    Activate {
        #[serde(default)]
        metadata: RequestMetadata,
        /// How long before activation the front end received the request.
        #[serde(default)]
        external_start_offset: Option<String>,
    },
    Advance {
        duration: String,
    },
    Fire {
        event: String,
        #[serde(default)]
        payload: Option<serde_json::Value>,
    },
    Record {
        label: String,
        #[serde(default)]
        description: Option<String>,
    },
    HttpStart {
        id: String,
        url: String,
        #[serde(default)]
        method: Option<String>,
    },
    HttpEnd {
        id: String,
        #[serde(default)]
        status: Option<u16>,
        #[serde(default)]
        error: Option<String>,
    },
    Query {
        text: String,
        duration: String,
        #[serde(default)]
        frames: Vec<Frame>,
    },
    SetMemory {
        current: u64,
        #[serde(default)]
        peak: Option<u64>,
    },
    Finish,
}

#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: String,
    pub steps: Vec<Step>,
}

/// What a replay produced.
#[derive(Debug, Clone)]
pub struct ScenarioOutcome {
    pub name: String,
    /// `None` when the scenario never activated the session.
    pub report: Option<Report>,
    pub lines: Vec<String>,
}

impl Scenario {
    pub fn load(path: &Path) -> ProfilerResult<Self> {
        let bytes = std::fs::read(path)?;
        let file: ScenarioFile = serde_json::from_slice(&bytes)?;
        Self::from_file(file)
    }

    pub fn from_json_str(json: &str) -> ProfilerResult<Self> {
        Self::from_file(serde_json::from_str(json)?)
    }

    fn from_file(file: ScenarioFile) -> ProfilerResult<Self> {
        if file.version != 1 {
            return Err(ProfilerError::Scenario(format!(
                "unsupported scenario version {} (expected 1)",
                file.version
            )));
        }
        Ok(Self {
            name: file.name,
            steps: file.steps,
        })
    }

    pub fn validate(&self) -> ProfilerResult<()> {
        let mut started = BTreeSet::new();
        for (i, step) in self.steps.iter().enumerate() {
            match step {
                Step::Advance { duration } | Step::Query { duration, .. } => {
                    parse_duration(duration)?;
                }
                Step::Activate {
                    external_start_offset: Some(offset),
                    ..
                } => {
                    parse_duration(offset)?;
                }
                Step::HttpStart { id, .. } => {
                    if !started.insert(id.as_str()) {
                        return Err(ProfilerError::Scenario(format!(
                            "step {i}: http call id {id:?} started twice"
                        )));
                    }
                }
                Step::HttpEnd { id, .. } if !started.contains(id.as_str()) => {
                    return Err(ProfilerError::Scenario(format!(
                        "step {i}: http call id {id:?} ended before it was started"
                    )));
                }
                Step::SetMemory {
                    current,
                    peak: Some(peak),
                } if peak < current => {
                    return Err(ProfilerError::Scenario(format!(
                        "step {i}: peak memory {peak} is below current {current}"
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Replays the steps and returns the report with its rendered lines. A
    /// scenario without a `finish` step still ends the request after its
    /// last step.
    pub fn run(&self, options: ProfilerOptions) -> ProfilerResult<ScenarioOutcome> {
        self.validate()?;
        options.validate()?;

        let clock = Arc::new(ManualClock::default());
        let memory = Arc::new(FixedMemory::new(0));
        let session = Arc::new(ProfilingSession::with_sources(
            options,
            clock.clone(),
            memory.clone(),
        ));
        let sink = Arc::new(MemorySink::new());
        let query_log = Arc::new(Mutex::new(Vec::<RawQuery>::new()));

        let log_source = Arc::clone(&query_log);
        // Activation is scripted, so the binder gets no activation hooks.
        let binder = LifecycleBinder::new(
            Arc::clone(&session),
            |_: &RequestMetadata| true,
            RequestMetadata::default(),
            Vec::<String>::new(),
        )
        .with_sink(sink.clone())
        .with_query_source(move || QueryLog::Entries(log_source.lock().clone()));
        let mut registry = HookRegistry::new();
        binder.bind(&mut registry);

        let mut tokens: HashMap<&str, CallToken> = HashMap::new();
        for step in &self.steps {
            match step {
                Step::Activate {
                    metadata,
                    external_start_offset,
                } => {
                    let mut metadata = metadata.clone();
                    if let Some(raw) = external_start_offset {
                        let offset = parse_duration(raw)?;
                        let received = time::Duration::try_from(offset)
                            .ok()
                            .and_then(|offset| clock.wall().checked_sub(offset))
                            .ok_or_else(|| {
                                ProfilerError::Scenario(format!(
                                    "external_start_offset {raw:?} puts the request before the earliest representable date"
                                ))
                            })?;
                        metadata.received_at = Some(received);
                    }
                    session.activate(metadata);
                }
                Step::Advance { duration } => clock.advance(parse_duration(duration)?),
                Step::Fire { event, payload } => {
                    let payload = match payload {
                        None | Some(serde_json::Value::Null) => Payload::None,
                        Some(serde_json::Value::Array(args)) => Payload::Event(args.clone()),
                        Some(value) => Payload::Value(value.clone()),
                    };
                    registry.fire(event, &payload);
                }
                Step::Record { label, description } => {
                    session.record(label, description.as_deref().unwrap_or_default());
                }
                Step::HttpStart { id, url, method } => {
                    if let Some(token) = session.http_start(url, method.as_deref().unwrap_or("GET"))
                    {
                        tokens.insert(id.as_str(), token);
                    }
                }
                Step::HttpEnd { id, status, error } => {
                    let Some(token) = tokens.get(id.as_str()) else {
                        continue;
                    };
                    let outcome = match error {
                        Some(message) => CallOutcome::error(message.clone()),
                        None => CallOutcome::Success {
                            status_code: *status,
                        },
                    };
                    session.http_end(token, outcome);
                }
                Step::Query {
                    text,
                    duration,
                    frames,
                } => {
                    let backtrace = if frames.is_empty() {
                        Backtrace::None
                    } else {
                        Backtrace::Frames(frames.clone())
                    };
                    let query = RawQuery::new(text.clone(), parse_duration(duration)?)
                        .with_backtrace(backtrace);
                    query_log.lock().push(query);
                }
                Step::SetMemory { current, peak } => memory.set(*current, *peak),
                Step::Finish => {
                    registry.fire(DEFAULT_SHUTDOWN_HOOK, &Payload::None);
                }
            }
        }
        if session.is_active() {
            registry.fire(DEFAULT_SHUTDOWN_HOOK, &Payload::None);
        }

        let report = binder.report();
        tracing::debug!(
            scenario = %self.name,
            reported = report.is_some(),
            "scenario replay finished"
        );
        Ok(ScenarioOutcome {
            name: self.name.clone(),
            report,
            lines: sink.lines(),
        })
    }

    pub fn example() -> ScenarioFile {
        ScenarioFile {
            version: 1,
            name: "form-submission".to_string(),
            steps: vec![
                Step::Activate {
                    metadata: RequestMetadata::for_action("form_submit"),
                    external_start_offset: Some("120ms".to_string()),
                },
                Step::Advance {
                    duration: "100ms".to_string(),
                },
                Step::Fire {
                    event: "init".to_string(),
                    payload: None,
                },
                Step::Query {
                    text: "SELECT * FROM forms WHERE id = 3".to_string(),
                    duration: "12ms".to_string(),
                    frames: Vec::new(),
                },
                Step::Finish,
            ],
        }
    }
}
