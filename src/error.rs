//! Error types and the user-facing diagnostics record

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Placeholder shown for conditions that cannot be attributed to any user file.
pub const NO_SOURCE_FILE: &str = "NoSourceFile";

/// Marker used when a location inside a generated file could not be resolved.
pub const UNRESOLVED_LINE: i32 = -1;

/// Severity of one reported compile or runtime condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
    /// Unrecoverable for this compile cycle: pipeline failures, constructor
    /// exceptions, runtime errors surfaced from the script.
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Severity::Info => "INF",
            Severity::Warning => "WRN",
            Severity::Error => "ERR",
            Severity::Fatal => "FTL",
        };
        write!(f, "{}", tag)
    }
}

/// One reported condition, always resolved to original user coordinates.
///
/// `file` is `None` for internal-only conditions (the wrapper unit, pipeline
/// failures); `line` is [`UNRESOLVED_LINE`] when no original line could be
/// recovered. Display never shows a generated file path or line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompileResult {
    pub severity: Severity,
    pub file: Option<PathBuf>,
    pub line: i32,
    pub message: String,
}

impl CompileResult {
    pub fn new(
        severity: Severity,
        file: Option<PathBuf>,
        line: i32,
        message: impl Into<String>,
    ) -> Self {
        Self { severity, file, line, message: message.into() }
    }

    /// A condition with no user-source attribution at all.
    pub fn internal(severity: Severity, message: impl Into<String>) -> Self {
        Self::new(severity, None, UNRESOLVED_LINE, message)
    }

    pub fn is_error(&self) -> bool {
        self.severity >= Severity::Error
    }
}

impl fmt::Display for CompileResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let file = self
            .file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| NO_SOURCE_FILE.to_string());
        if self.line == UNRESOLVED_LINE {
            write!(f, "{} {}: {}", self.severity, file, self.message)
        } else {
            write!(f, "{} {}({}): {}", self.severity, file, self.line, self.message)
        }
    }
}

#[derive(Error, Debug)]
pub enum CompilerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Script error: {message}")]
    Script { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("Invalid format: {message}")]
    InvalidFormat { message: String },
}

pub type Result<T> = std::result::Result<T, CompilerError>;

impl CompilerError {
    pub fn script(message: impl Into<String>) -> Self {
        Self::Script { message: message.into() }
    }
}

impl From<mlua::Error> for CompilerError {
    fn from(err: mlua::Error) -> Self {
        Self::Script { message: err.to_string() }
    }
}
