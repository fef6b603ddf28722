//! Wiring between a host's named lifecycle events and a [`ProfilingSession`].
//!
//! The host owns the event dispatcher; the binder only subscribes handlers.
//! Activation handlers are registered unconditionally at the earliest
//! priority so the session can start before anything else observes the
//! request. Every other handler stays registered for the whole request and
//! short-circuits while the session is inactive.

use parking_lot::Mutex;
use serde_json::Value;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::{
    LogSink, ProfilingSession, QueryLog, Report, RequestClassifier, RequestMetadata, TracingSink,
    labels,
};

/// Priority used for activation handlers; runs before any other subscriber.
pub const ACTIVATION_PRIORITY: i32 = i32::MIN;
/// Priority used for stage checkpoints.
pub const STAGE_PRIORITY: i32 = 1;
/// Output markers run after the host's own handlers on the same hook but
/// before the report.
pub const OUTPUT_PRIORITY: i32 = REPORT_PRIORITY - 1;
/// Priority of the end-of-request report; runs after every other subscriber.
pub const REPORT_PRIORITY: i32 = i32::MAX;

pub const DEFAULT_SHUTDOWN_HOOK: &str = "shutdown";

/// Arguments a host passes along with an event.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Payload {
    #[default]
    None,
    Value(Value),
    Event(Vec<Value>),
}

impl Payload {
    pub fn args(values: impl IntoIterator<Item = Value>) -> Self {
        Self::Event(values.into_iter().collect())
    }

    /// Positional argument `index`; a single value is argument 0.
    pub fn arg(&self, index: usize) -> Option<&Value> {
        let value = match self {
            Self::None => None,
            Self::Value(v) => (index == 0).then_some(v),
            Self::Event(values) => values.get(index),
        };
        value.filter(|v| !v.is_null())
    }

    /// Number of entries in argument `index` when it is a list or map.
    /// Anything else counts as zero.
    pub fn count_of(&self, index: usize) -> usize {
        match self.arg(index) {
            Some(Value::Array(items)) => items.len(),
            Some(Value::Object(map)) => map.len(),
            _ => 0,
        }
    }

    /// Argument 0 as an identifier, if it is a number or a non-empty string.
    pub fn first_id(&self) -> Option<String> {
        match self.arg(0)? {
            Value::Number(n) => Some(n.to_string()),
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            _ => None,
        }
    }

    pub fn first_str(&self) -> Option<&str> {
        self.arg(0)?.as_str().map(str::trim).filter(|s| !s.is_empty())
    }
}

/// Where the binder subscribes an event's handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookBinding {
    Named(&'static str),
    /// Every activation hook, after the activation handler and the host's
    /// own request handler.
    Activation,
    /// The binder's end-of-request hook.
    Shutdown,
}

/// A lifecycle stage the binder records a checkpoint for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    MupluginsLoaded,
    PluginsLoaded,
    Init,
    WpLoaded,
    BeforeProcessing,
    ValidationErrors,
    BeforeInsert,
    AfterInsertSubmission,
    SubmissionInserted,
    BeforeActions,
    DuringActions,
    AfterActions,
    BeforeActionsCompleted,
    AfterActionsCompleted,
    Notify,
    ProcessPayment,
    IntegrationNotify,
    WebhookReceived,
    SendToWebhook,
    SubmissionConfirmation,
    SubmissionMessage,
    AfterSubmissionConfirmation,
    OutputStart,
    OutputEnd,
    PluginActivated,
    PluginLoaded,
    TribeEventsLoaded,
    EventTicketsLoaded,
    WooCommerceLoaded,
    FluentFormLoaded,
}

impl LifecycleEvent {
    pub const ALL: [Self; 30] = [
        Self::MupluginsLoaded,
        Self::PluginsLoaded,
        Self::Init,
        Self::WpLoaded,
        Self::BeforeProcessing,
        Self::ValidationErrors,
        Self::BeforeInsert,
        Self::AfterInsertSubmission,
        Self::SubmissionInserted,
        Self::BeforeActions,
        Self::DuringActions,
        Self::AfterActions,
        Self::BeforeActionsCompleted,
        Self::AfterActionsCompleted,
        Self::Notify,
        Self::ProcessPayment,
        Self::IntegrationNotify,
        Self::WebhookReceived,
        Self::SendToWebhook,
        Self::SubmissionConfirmation,
        Self::SubmissionMessage,
        Self::AfterSubmissionConfirmation,
        Self::OutputStart,
        Self::OutputEnd,
        Self::PluginActivated,
        Self::PluginLoaded,
        Self::TribeEventsLoaded,
        Self::EventTicketsLoaded,
        Self::WooCommerceLoaded,
        Self::FluentFormLoaded,
    ];

    pub fn binding(self) -> HookBinding {
        use HookBinding::Named;
        match self {
            Self::MupluginsLoaded => Named("muplugins_loaded"),
            Self::PluginsLoaded => Named("plugins_loaded"),
            Self::Init => Named("init"),
            Self::WpLoaded => Named("wp_loaded"),
            Self::BeforeProcessing => Named("fluentform/before_form_data_processing"),
            Self::ValidationErrors => Named("fluentform/validation_errors"),
            Self::BeforeInsert => Named("fluentform/before_insert_submission"),
            Self::AfterInsertSubmission => Named("fluentform/after_insert_submission"),
            Self::SubmissionInserted => Named("fluentform/submission_inserted"),
            Self::BeforeActions => Named("fluentform/before_form_actions_processing"),
            Self::DuringActions => Named("fluentform/form_actions_processing"),
            Self::AfterActions => Named("fluentform/after_form_actions_processing"),
            Self::BeforeActionsCompleted => {
                Named("fluentform/before_form_actions_processing_completed")
            }
            Self::AfterActionsCompleted => {
                Named("fluentform/after_form_actions_processing_completed")
            }
            Self::Notify => Named("fluentform_notify"),
            Self::ProcessPayment => Named("fluentform_process_payment"),
            Self::IntegrationNotify => Named("fluentform_integration_notify"),
            Self::WebhookReceived => Named("fluentform_webhook_received"),
            Self::SendToWebhook => Named("fluentform/send_to_webhook"),
            Self::SubmissionConfirmation => Named("fluentform/submission_confirmation"),
            Self::SubmissionMessage => Named("fluentform/submission_message"),
            Self::AfterSubmissionConfirmation => {
                Named("fluentform/after_submission_confirmation")
            }
            Self::OutputStart => HookBinding::Activation,
            Self::OutputEnd => HookBinding::Shutdown,
            Self::PluginActivated => Named("activate_plugin"),
            Self::PluginLoaded => Named("plugin_loaded"),
            Self::TribeEventsLoaded => Named("tribe-events_loaded"),
            Self::EventTicketsLoaded => Named("event-tickets_loaded"),
            Self::WooCommerceLoaded => Named("woocommerce_loaded"),
            Self::FluentFormLoaded => Named("fluentform_loaded"),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::MupluginsLoaded => labels::MUPLUGINS_LOADED,
            Self::PluginsLoaded => labels::PLUGINS_LOADED,
            Self::Init => labels::INIT,
            Self::WpLoaded => labels::WP_LOADED,
            Self::BeforeProcessing => labels::BEFORE_PROCESSING,
            Self::ValidationErrors => labels::VALIDATION,
            Self::BeforeInsert => labels::BEFORE_INSERT,
            Self::AfterInsertSubmission => labels::AFTER_INSERT_SUBMISSION,
            Self::SubmissionInserted => labels::AFTER_INSERT,
            Self::BeforeActions => labels::BEFORE_ACTIONS,
            Self::DuringActions => labels::DURING_ACTIONS,
            Self::AfterActions => labels::AFTER_ACTIONS,
            Self::BeforeActionsCompleted => labels::BEFORE_ACTIONS_COMPLETED,
            Self::AfterActionsCompleted => labels::AFTER_ACTIONS_COMPLETED,
            Self::Notify => labels::NOTIFY,
            Self::ProcessPayment => labels::PROCESS_PAYMENT,
            Self::IntegrationNotify => labels::INTEGRATION_NOTIFY,
            Self::WebhookReceived => labels::WEBHOOK_RECEIVED,
            Self::SendToWebhook => labels::SEND_TO_WEBHOOK,
            Self::SubmissionConfirmation => labels::CONFIRMATION,
            Self::SubmissionMessage => labels::SUBMISSION_MESSAGE,
            Self::AfterSubmissionConfirmation => labels::AFTER_CONFIRMATION,
            Self::OutputStart => labels::OUTPUT_START,
            Self::OutputEnd => labels::OUTPUT_END,
            Self::PluginActivated => labels::PLUGIN_ACTIVATE,
            Self::PluginLoaded
            | Self::TribeEventsLoaded
            | Self::EventTicketsLoaded
            | Self::WooCommerceLoaded
            | Self::FluentFormLoaded => labels::PLUGIN_LOADED,
        }
    }

    /// Output markers land after the host's handlers and before the report
    /// closes the session.
    pub fn priority(self) -> i32 {
        match self {
            Self::OutputStart | Self::OutputEnd => OUTPUT_PRIORITY,
            _ => STAGE_PRIORITY,
        }
    }

    /// Checkpoint description. Never fails; unreadable payloads fall back to
    /// placeholders.
    pub fn describe(self, payload: &Payload) -> String {
        match self {
            Self::MupluginsLoaded => "MU-plugins loaded".to_string(),
            Self::PluginsLoaded => "All plugins loaded".to_string(),
            Self::Init => "Framework init".to_string(),
            Self::WpLoaded => "Framework fully loaded".to_string(),
            Self::BeforeProcessing => "Before data processing".to_string(),
            Self::ValidationErrors => {
                format!("Validation - {} errors", payload.count_of(0))
            }
            Self::BeforeInsert => "Before database insert".to_string(),
            Self::AfterInsertSubmission => "Submission insert finished".to_string(),
            Self::SubmissionInserted => format!(
                "After database insert - ID: {}",
                payload.first_id().unwrap_or_else(|| "unknown".to_string())
            ),
            Self::BeforeActions => "Before actions (emails, integrations)".to_string(),
            Self::DuringActions => "Processing actions".to_string(),
            Self::AfterActions => "Actions complete".to_string(),
            Self::BeforeActionsCompleted => "Before-actions stage completed".to_string(),
            Self::AfterActionsCompleted => "After-actions stage completed".to_string(),
            Self::Notify => "Notification dispatched".to_string(),
            Self::ProcessPayment => "Payment processing".to_string(),
            Self::IntegrationNotify => "Integration notified".to_string(),
            Self::WebhookReceived => "Webhook received".to_string(),
            Self::SendToWebhook => "Sending to webhook".to_string(),
            Self::SubmissionConfirmation => "Confirmation prepared".to_string(),
            Self::SubmissionMessage => "Submission message prepared".to_string(),
            Self::AfterSubmissionConfirmation => "Confirmation sent".to_string(),
            Self::OutputStart => "Response output started".to_string(),
            Self::OutputEnd => "Response output finished".to_string(),
            Self::PluginActivated => {
                format!("Plugin activated: {}", plugin_name(payload))
            }
            Self::PluginLoaded => format!("{} initialized", plugin_name(payload)),
            Self::TribeEventsLoaded => "The Events Calendar initialized".to_string(),
            Self::EventTicketsLoaded => "Event Tickets initialized".to_string(),
            Self::WooCommerceLoaded => "WooCommerce initialized".to_string(),
            Self::FluentFormLoaded => "FluentForm initialized".to_string(),
        }
    }

    /// The event subscribed to a fixed hook name. Activation and shutdown
    /// bound events are configured per binder and never match.
    pub fn from_hook(hook: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|e| matches!(e.binding(), HookBinding::Named(name) if name == hook))
    }
}

/// `vendor/plugin.php` style identifiers shorten to `plugin`.
fn plugin_name(payload: &Payload) -> String {
    let Some(raw) = payload.first_str() else {
        return "unknown".to_string();
    };
    let file = raw.rsplit(['/', '\\']).next().unwrap_or(raw);
    file.strip_suffix(".php").unwrap_or(file).to_string()
}

pub type Handler = Box<dyn Fn(&Payload) + Send + Sync>;

/// A host's subscription API.
pub trait EventDispatcher {
    /// Lower priorities run first; equal priorities run in subscription order.
    fn subscribe(&mut self, hook: &str, priority: i32, handler: Handler);
}

/// The host's query log, read once at end of request.
pub trait QuerySource: Send + Sync {
    fn query_log(&self) -> QueryLog;
}

impl<F> QuerySource for F
where
    F: Fn() -> QueryLog + Send + Sync,
{
    fn query_log(&self) -> QueryLog {
        self()
    }
}

/// In-process dispatcher: named hooks with priority-ordered handlers.
#[derive(Default)]
pub struct HookRegistry {
    hooks: BTreeMap<String, Vec<(i32, Handler)>>,
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: BTreeMap<&str, usize> =
            self.hooks.iter().map(|(k, v)| (k.as_str(), v.len())).collect();
        f.debug_struct("HookRegistry").field("hooks", &counts).finish()
    }
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invokes every handler on `hook` in priority order. Returns how many
    /// ran.
    pub fn fire(&self, hook: &str, payload: &Payload) -> usize {
        let Some(handlers) = self.hooks.get(hook) else {
            return 0;
        };
        for (_, handler) in handlers {
            handler(payload);
        }
        handlers.len()
    }

    pub fn handler_count(&self, hook: &str) -> usize {
        self.hooks.get(hook).map_or(0, Vec::len)
    }

    pub fn hook_names(&self) -> impl Iterator<Item = &str> {
        self.hooks.keys().map(String::as_str)
    }
}

impl EventDispatcher for HookRegistry {
    fn subscribe(&mut self, hook: &str, priority: i32, handler: Handler) {
        let handlers = self.hooks.entry(hook.to_string()).or_default();
        let at = handlers.partition_point(|(p, _)| *p <= priority);
        handlers.insert(at, (priority, handler));
    }
}

/// Subscribes a session to a host's lifecycle.
pub struct LifecycleBinder {
    session: Arc<ProfilingSession>,
    classifier: Arc<dyn RequestClassifier>,
    metadata: RequestMetadata,
    activation_hooks: Vec<String>,
    shutdown_hook: String,
    queries: Arc<dyn QuerySource>,
    sink: Arc<dyn LogSink>,
    report: Arc<Mutex<Option<Report>>>,
}

impl LifecycleBinder {
    /// `activation_hooks` are the events on which the classifier is
    /// consulted; the first one to fire for a matching request activates
    /// the session.
    pub fn new(
        session: Arc<ProfilingSession>,
        classifier: impl RequestClassifier + 'static,
        metadata: RequestMetadata,
        activation_hooks: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            session,
            classifier: Arc::new(classifier),
            metadata,
            activation_hooks: activation_hooks.into_iter().map(Into::into).collect(),
            shutdown_hook: DEFAULT_SHUTDOWN_HOOK.to_string(),
            queries: Arc::new(|| QueryLog::Absent),
            sink: Arc::new(TracingSink),
            report: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_query_source(mut self, source: impl QuerySource + 'static) -> Self {
        self.queries = Arc::new(source);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_shutdown_hook(mut self, hook: impl Into<String>) -> Self {
        self.shutdown_hook = hook.into();
        self
    }

    pub fn session(&self) -> &Arc<ProfilingSession> {
        &self.session
    }

    /// The report produced at shutdown, once it has run.
    pub fn report(&self) -> Option<Report> {
        self.report.lock().clone()
    }

    pub fn bind(&self, dispatcher: &mut dyn EventDispatcher) {
        for hook in &self.activation_hooks {
            let session = Arc::clone(&self.session);
            let classifier = Arc::clone(&self.classifier);
            let metadata = self.metadata.clone();
            dispatcher.subscribe(
                hook,
                ACTIVATION_PRIORITY,
                Box::new(move |_| {
                    if session.is_active() || session.is_finished() {
                        return;
                    }
                    if classifier.matches(&metadata) {
                        session.activate(metadata.clone());
                    }
                }),
            );
        }

        for event in LifecycleEvent::ALL {
            let hooks = match event.binding() {
                HookBinding::Named(hook) => vec![hook.to_string()],
                HookBinding::Activation => self.activation_hooks.clone(),
                HookBinding::Shutdown => vec![self.shutdown_hook.clone()],
            };
            for hook in hooks {
                let session = Arc::clone(&self.session);
                let function = hook.clone();
                dispatcher.subscribe(
                    &hook,
                    event.priority(),
                    Box::new(move |payload| {
                        if !session.is_active() {
                            return;
                        }
                        session.record_from(event.label(), &event.describe(payload), &function);
                    }),
                );
            }
        }

        let session = Arc::clone(&self.session);
        let queries = Arc::clone(&self.queries);
        let sink = Arc::clone(&self.sink);
        let slot = Arc::clone(&self.report);
        dispatcher.subscribe(
            &self.shutdown_hook,
            REPORT_PRIORITY,
            Box::new(move |_| {
                if !session.is_active() {
                    return;
                }
                session.collect_queries(&queries.query_log());
                if let Some(report) = session.finish_into(sink.as_ref()) {
                    *slot.lock() = Some(report);
                }
            }),
        );

        tracing::debug!(
            activation_hooks = self.activation_hooks.len(),
            shutdown = %self.shutdown_hook,
            "lifecycle handlers bound"
        );
    }
}

impl std::fmt::Debug for LifecycleBinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleBinder")
            .field("session", &self.session)
            .field("activation_hooks", &self.activation_hooks)
            .field("shutdown_hook", &self.shutdown_hook)
            .finish_non_exhaustive()
    }
}
