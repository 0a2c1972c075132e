//! # Blockflow Logger
//!
//! Tracing subscriber set-up and terminal summaries for block runs

use blockflow_core::{Action, ActivityData, RegisteredError, Status};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logger for blockflow runs
pub struct Logger {
    pub trace_id: String,
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

impl Logger {
    /// Create a new logger
    pub fn new() -> Self {
        Self {
            trace_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create a logger with a specific trace ID, usually the flow run id
    pub fn with_trace_id(trace_id: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
        }
    }

    fn env_filter() -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }

    /// Initialize tracing subscriber
    pub fn init_tracing() {
        Self::init_with_format(LogFormat::Text);
    }

    /// Initialize a JSON tracing subscriber
    pub fn init_json_tracing() {
        Self::init_with_format(LogFormat::Json);
    }

    /// Initialize the subscriber once; later calls are ignored so tests can
    /// call it freely.
    pub fn init_with_format(format: LogFormat) {
        let builder = tracing_subscriber::fmt().with_env_filter(Self::env_filter());
        let result = match format {
            LogFormat::Text => builder.try_init(),
            LogFormat::Json => builder.json().try_init(),
        };
        if result.is_err() {
            debug!("tracing subscriber already installed");
        }
    }

    /// Log an info message
    pub fn info(&self, message: &str) {
        info!(trace_id = %self.trace_id, "{}", message);
    }

    /// Log a warning message
    pub fn warn(&self, message: &str) {
        warn!(trace_id = %self.trace_id, "{}", message);
    }

    /// Log an error message
    pub fn error(&self, message: &str) {
        error!(trace_id = %self.trace_id, "{}", message);
    }

    /// Log block run summary
    pub fn log_block_summary(&self, block_id: &str, status: Status, activities: &[ActivityData]) {
        let count = |status: Status| activities.iter().filter(|a| a.status == status).count();
        let ran = activities.iter().filter(|a| a.action == Action::Run).count();

        info!(
            trace_id = %self.trace_id,
            block_id = %block_id,
            status = %status,
            total_activities = activities.len(),
            ran = ran,
            success = count(Status::Success),
            failed = count(Status::Fail),
            errors = count(Status::Error),
            skipped = count(Status::Skipped),
            aborted = count(Status::Aborted),
            "Activity block summary"
        );
    }

    /// Log activity details
    pub fn log_activity_details(&self, activities: &[ActivityData]) {
        for activity in activities {
            match activity.status {
                Status::Success => {
                    info!(
                        trace_id = %self.trace_id,
                        activity_id = %activity.id,
                        action = %activity.action,
                        "Activity succeeded"
                    );
                }
                Status::Fail | Status::Error => {
                    error!(
                        trace_id = %self.trace_id,
                        activity_id = %activity.id,
                        action = %activity.action,
                        status = %activity.status,
                        "Activity did not succeed"
                    );
                }
                Status::Skipped | Status::Aborted | Status::Unknown => {
                    warn!(
                        trace_id = %self.trace_id,
                        activity_id = %activity.id,
                        action = %activity.action,
                        status = %activity.status,
                        "Activity not executed"
                    );
                }
            }
        }
    }

    /// Log every registered error with its id
    pub fn log_error_summary(&self, errors: &[RegisteredError]) {
        if errors.is_empty() {
            return;
        }
        error!(trace_id = %self.trace_id, count = errors.len(), "Errors registered during the run");
        for registered in errors {
            error!(
                trace_id = %self.trace_id,
                error_id = %registered.id,
                kind = %registered.kind,
                activity_id = registered.activity_id.as_deref().unwrap_or("-"),
                fatal = registered.fatal,
                "{}",
                registered.message
            );
        }
    }
}
