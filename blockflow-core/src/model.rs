//! Status, action, mode and group enums shared by every layer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of an activity or of a whole block.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Success,
    Fail,
    Error,
    Skipped,
    Aborted,
    #[default]
    Unknown,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Success => "SUCCESS",
            Status::Fail => "FAIL",
            Status::Error => "ERROR",
            Status::Skipped => "SKIPPED",
            Status::Aborted => "ABORTED",
            Status::Unknown => "UNKNOWN",
        }
    }

    /// Reads a status persisted as a JSON string.
    pub fn from_value(value: &serde_json::Value) -> Option<Status> {
        serde_json::from_value(value.clone()).ok()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A status as written in configuration predicates, `ALL` matches anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusMatcher {
    Success,
    Fail,
    Error,
    Skipped,
    Aborted,
    Unknown,
    All,
}

impl StatusMatcher {
    pub fn matches(&self, status: Status) -> bool {
        match self {
            StatusMatcher::All => true,
            StatusMatcher::Success => status == Status::Success,
            StatusMatcher::Fail => status == Status::Fail,
            StatusMatcher::Error => status == Status::Error,
            StatusMatcher::Skipped => status == Status::Skipped,
            StatusMatcher::Aborted => status == Status::Aborted,
            StatusMatcher::Unknown => status == Status::Unknown,
        }
    }
}

impl From<Status> for StatusMatcher {
    fn from(status: Status) -> Self {
        match status {
            Status::Success => StatusMatcher::Success,
            Status::Fail => StatusMatcher::Fail,
            Status::Error => StatusMatcher::Error,
            Status::Skipped => StatusMatcher::Skipped,
            Status::Aborted => StatusMatcher::Aborted,
            Status::Unknown => StatusMatcher::Unknown,
        }
    }
}

pub fn matches_any(matchers: &[StatusMatcher], status: Status) -> bool {
    matchers.iter().any(|m| m.matches(status))
}

/// What the engine decided to do with an activity slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Run,
    SkipByFramework,
    SkipByConfiguration,
    Reuse,
    SkipWithOutputValues,
    KeepAsIs,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Run => "RUN",
            Action::SkipByFramework => "SKIP_BY_FRAMEWORK",
            Action::SkipByConfiguration => "SKIP_BY_CONFIGURATION",
            Action::Reuse => "REUSE",
            Action::SkipWithOutputValues => "SKIP_WITH_OUTPUT_VALUES",
            Action::KeepAsIs => "KEEP_AS_IS",
        }
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, Action::SkipByFramework | Action::SkipByConfiguration)
    }

    /// Whether the slot produced outputs of its own.
    pub fn produces_result(&self) -> bool {
        matches!(
            self,
            Action::Run | Action::Reuse | Action::SkipWithOutputValues
        )
    }

    /// Severity used when combining verdicts:
    /// `RUN` < `SKIP_BY_CONFIGURATION` < `SKIP_BY_FRAMEWORK`.
    fn severity(&self) -> u8 {
        match self {
            Action::SkipByFramework => 2,
            Action::SkipByConfiguration => 1,
            _ => 0,
        }
    }

    pub fn most_severe(self, other: Action) -> Action {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level invocation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mode {
    ActivityBlock,
    ActivityInBlock,
    ActivityBlockRerun,
    Activity,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::ActivityBlock => "ACTIVITY_BLOCK",
            Mode::ActivityInBlock => "ACTIVITY_IN_BLOCK",
            Mode::ActivityBlockRerun => "ACTIVITY_BLOCK_RERUN",
            Mode::Activity => "ACTIVITY",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The five activity groups of a block, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Group {
    BeforeBlock,
    BeforeActivity,
    MainActivity,
    AfterActivity,
    AfterBlock,
}

impl Group {
    pub fn as_str(&self) -> &'static str {
        match self {
            Group::BeforeBlock => "BEFORE_BLOCK",
            Group::BeforeActivity => "BEFORE_ACTIVITY",
            Group::MainActivity => "MAIN_ACTIVITY",
            Group::AfterActivity => "AFTER_ACTIVITY",
            Group::AfterBlock => "AFTER_BLOCK",
        }
    }

    /// Groups that are framework-skipped once the block is interrupted.
    pub fn skipped_when_interrupted(&self) -> bool {
        matches!(
            self,
            Group::BeforeBlock | Group::BeforeActivity | Group::MainActivity
        )
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
