//! Checkpoint labels emitted by the profiler itself.

pub const SESSION_START: &str = "SESSION_START";
pub const MUPLUGINS_LOADED: &str = "MUPLUGINS_LOADED";
pub const PLUGINS_LOADED: &str = "PLUGINS_LOADED";
pub const INIT: &str = "INIT";
pub const WP_LOADED: &str = "WP_LOADED";
pub const BEFORE_PROCESSING: &str = "BEFORE_PROCESSING";
pub const VALIDATION: &str = "VALIDATION";
pub const BEFORE_INSERT: &str = "BEFORE_INSERT";
pub const AFTER_INSERT_SUBMISSION: &str = "AFTER_INSERT_SUBMISSION";
pub const AFTER_INSERT: &str = "AFTER_INSERT";
pub const BEFORE_ACTIONS: &str = "BEFORE_ACTIONS";
pub const DURING_ACTIONS: &str = "DURING_ACTIONS";
pub const AFTER_ACTIONS: &str = "AFTER_ACTIONS";
pub const BEFORE_ACTIONS_COMPLETED: &str = "BEFORE_ACTIONS_COMPLETED";
pub const AFTER_ACTIONS_COMPLETED: &str = "AFTER_ACTIONS_COMPLETED";
pub const NOTIFY: &str = "NOTIFY";
pub const PROCESS_PAYMENT: &str = "PROCESS_PAYMENT";
pub const INTEGRATION_NOTIFY: &str = "INTEGRATION_NOTIFY";
pub const WEBHOOK_RECEIVED: &str = "WEBHOOK_RECEIVED";
pub const SEND_TO_WEBHOOK: &str = "SEND_TO_WEBHOOK";
pub const CONFIRMATION: &str = "CONFIRMATION";
pub const SUBMISSION_MESSAGE: &str = "SUBMISSION_MESSAGE";
pub const AFTER_CONFIRMATION: &str = "AFTER_CONFIRMATION";
pub const OUTPUT_START: &str = "OUTPUT_START";
pub const OUTPUT_END: &str = "OUTPUT_END";
pub const PLUGIN_ACTIVATE: &str = "PLUGIN_ACTIVATE";
pub const PLUGIN_LOADED: &str = "PLUGIN_LOADED";
pub const HTTP_START: &str = "HTTP_START";
pub const HTTP_END: &str = "HTTP_END";
pub const DB_QUERIES_COLLECTED: &str = "DB_QUERIES_COLLECTED";
