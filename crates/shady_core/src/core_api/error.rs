use std::error::Error;
use std::fmt;
use std::io;

use super::types::Stage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreErrorCode {
    Io,
    Format,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreError {
    pub code: CoreErrorCode,
    pub stage: Stage,
    pub message: String,
}

impl CoreError {
    pub fn new(code: CoreErrorCode, stage: Stage, message: impl Into<String>) -> Self {
        Self {
            code,
            stage,
            message: message.into(),
        }
    }

    pub fn io(stage: Stage, message: impl Into<String>) -> Self {
        Self::new(CoreErrorCode::Io, stage, message)
    }

    pub fn format(stage: Stage, message: impl Into<String>) -> Self {
        Self::new(CoreErrorCode::Format, stage, message)
    }

    pub fn cancelled(stage: Stage) -> Self {
        Self::new(CoreErrorCode::Cancelled, stage, "operation cancelled")
    }

    /// Classifies an I/O error raised while a compressed stream was being read.
    /// flate2 reports bad headers and corrupt deflate data as `InvalidInput` or
    /// `InvalidData`, and a cut-off stream as `UnexpectedEof`.
    pub fn from_stream(stage: Stage, context: &str, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => {
                Self::format(stage, format!("{context}: invalid gzip stream: {err}"))
            }
            io::ErrorKind::UnexpectedEof => {
                Self::format(stage, format!("{context}: truncated gzip stream: {err}"))
            }
            _ => Self::io(stage, format!("{context}: {err}")),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.code == CoreErrorCode::Cancelled
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} during {}: {}", self.code, self.stage, self.message)
    }
}

impl Error for CoreError {}
