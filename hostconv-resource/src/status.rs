//! Change reports produced by `check` and `apply`.
//!
//! A [`Status`] is the unit every presentation layer formats: a level, the
//! lines a task logged while it ran, and a map of field differences.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// How far the current state is from the desired state.
///
/// Ordered so that a report can only be raised, never lowered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusLevel {
    /// Resource already matches the desired state.
    #[default]
    NoChange,
    /// A mutation is planned (check) or happened (apply).
    WillChange,
    /// The resource cannot be reconciled under current conditions.
    Fatal,
}

impl fmt::Display for StatusLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusLevel::NoChange => write!(f, "no change"),
            StatusLevel::WillChange => write!(f, "will change"),
            StatusLevel::Fatal => write!(f, "fatal"),
        }
    }
}

/// A single field difference: previous value, planned or actual value, and
/// free-form metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Difference {
    pub original: String,
    pub current: String,
    pub default: String,
}

impl fmt::Display for Difference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} => {}", self.original, self.current)
    }
}

/// The change report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Status {
    pub level: StatusLevel,
    pub output: Vec<String>,
    pub differences: BTreeMap<String, Difference>,
}

impl Status {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the level. Lower levels are ignored.
    pub fn raise_level(&mut self, level: StatusLevel) {
        if level > self.level {
            self.level = level;
        }
    }

    /// Append a line to the output.
    pub fn add_message(&mut self, message: impl Into<String>) {
        self.output.push(message.into());
    }

    /// Record a difference for `field`, replacing any earlier entry.
    pub fn add_difference(
        &mut self,
        field: impl Into<String>,
        original: impl Into<String>,
        current: impl Into<String>,
        default: impl Into<String>,
    ) {
        self.differences.insert(
            field.into(),
            Difference {
                original: original.into(),
                current: current.into(),
                default: default.into(),
            },
        );
    }

    pub fn has_changes(&self) -> bool {
        self.level == StatusLevel::WillChange || !self.differences.is_empty()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "level: {}", self.level)?;
        for line in &self.output {
            writeln!(f, "  {}", line)?;
        }
        for (field, diff) in &self.differences {
            writeln!(f, "  {}: {}", field, diff)?;
        }
        Ok(())
    }
}

/// Common view over resource-specific reports.
///
/// Kinds that report more than a [`Status`] (a device path, an address)
/// expose those fields through [`TaskStatus::details`] so callers can
/// render them without knowing the kind.
pub trait TaskStatus: fmt::Debug + Send + Sync {
    fn report(&self) -> &Status;

    fn details(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }
}

impl TaskStatus for Status {
    fn report(&self) -> &Status {
        self
    }
}
