//! Error registry: every failure the engine observes is recorded here with a
//! kind, an optional activity id and a fatal flag. A fatal error latches the
//! abort flag for the rest of the invocation.

use serde::Serialize;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    ActivityCreation,
    ActivityConfiguration,
    ActivityInput,
    ActivityOutput,
    ActivityRun,
    ActivityPostprocess,
    ActivityBlock,
    ActivityBlockCallback,
    FlowConfiguration,
    Extension,
    SetUp,
    TearDown,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ActivityCreation => "ACTIVITY_CREATION",
            ErrorKind::ActivityConfiguration => "ACTIVITY_CONFIGURATION",
            ErrorKind::ActivityInput => "ACTIVITY_INPUT",
            ErrorKind::ActivityOutput => "ACTIVITY_OUTPUT",
            ErrorKind::ActivityRun => "ACTIVITY_RUN",
            ErrorKind::ActivityPostprocess => "ACTIVITY_POSTPROCESS",
            ErrorKind::ActivityBlock => "ACTIVITY_BLOCK",
            ErrorKind::ActivityBlockCallback => "ACTIVITY_BLOCK_CALLBACK",
            ErrorKind::FlowConfiguration => "FLOW_CONFIGURATION",
            ErrorKind::Extension => "EXTENSION",
            ErrorKind::SetUp => "SET_UP",
            ErrorKind::TearDown => "TEAR_DOWN",
            ErrorKind::Internal => "INTERNAL",
        }
    }

    /// Framework errors come from the engine rather than from one
    /// activity's own binding or run.
    pub fn is_framework(&self) -> bool {
        !matches!(
            self,
            ErrorKind::ActivityConfiguration
                | ErrorKind::ActivityInput
                | ErrorKind::ActivityOutput
                | ErrorKind::ActivityRun
                | ErrorKind::ActivityPostprocess
                | ErrorKind::ActivityBlockCallback
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisteredError {
    pub id: Uuid,
    pub kind: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity_id: Option<String>,
    pub message: String,
    pub fatal: bool,
}

impl fmt::Display for RegisteredError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)?;
        if let Some(activity_id) = &self.activity_id {
            write!(f, " (activity '{activity_id}')")?;
        }
        write!(f, " id={}", self.id)
    }
}

#[derive(Debug, Default, Clone)]
pub struct ErrorRegistry {
    errors: Vec<RegisteredError>,
    aborted: bool,
}

impl ErrorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a non-fatal error and returns its id.
    pub fn register(
        &mut self,
        kind: ErrorKind,
        activity_id: Option<&str>,
        message: impl Into<String>,
    ) -> Uuid {
        self.push(kind, activity_id, message.into(), false)
    }

    /// Records a fatal error and latches the abort flag.
    pub fn register_fatal(
        &mut self,
        kind: ErrorKind,
        activity_id: Option<&str>,
        message: impl Into<String>,
    ) -> Uuid {
        self.aborted = true;
        self.push(kind, activity_id, message.into(), true)
    }

    fn push(
        &mut self,
        kind: ErrorKind,
        activity_id: Option<&str>,
        message: String,
        fatal: bool,
    ) -> Uuid {
        let id = Uuid::new_v4();
        if fatal {
            tracing::error!(error_id = %id, kind = %kind, activity_id, "{message}");
        } else {
            tracing::warn!(error_id = %id, kind = %kind, activity_id, "{message}");
        }
        self.errors.push(RegisteredError {
            id,
            kind,
            activity_id: activity_id.map(str::to_string),
            message,
            fatal,
        });
        id
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    pub fn errors(&self) -> &[RegisteredError] {
        &self.errors
    }

    pub fn of_kind(&self, kind: ErrorKind) -> impl Iterator<Item = &RegisteredError> {
        self.errors.iter().filter(move |e| e.kind == kind)
    }

    pub fn for_activity<'a>(
        &'a self,
        activity_id: &'a str,
    ) -> impl Iterator<Item = &'a RegisteredError> {
        self.errors
            .iter()
            .filter(move |e| e.activity_id.as_deref() == Some(activity_id))
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }
}
