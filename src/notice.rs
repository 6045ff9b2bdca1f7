use std::fmt;

use serde::Serialize;

use crate::errors::PalettaError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// A transient, non-blocking message for the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.level {
            NoticeLevel::Info => "",
            NoticeLevel::Warning => "warning: ",
            NoticeLevel::Error => "error: ",
        };
        write!(f, "{}{}", prefix, self.message)
    }
}

pub trait Notifier {
    fn notify(&self, notice: Notice);
}

pub struct StderrNotifier;

impl Notifier for StderrNotifier {
    fn notify(&self, notice: Notice) {
        eprintln!("{}", notice);
    }
}

/// How a failed store operation is reported to the user.
pub fn notice_for_error(error: &PalettaError) -> Notice {
    match error {
        PalettaError::NotFound(_) | PalettaError::AlreadyExists(_) => {
            Notice::warning(error.to_string())
        }
        PalettaError::StaleSnapshot { .. } => {
            Notice::warning("the list changed since it was shown; list it again and retry")
        }
        e if e.is_persistence() => Notice::error(format!(
            "could not update the store, nothing was changed ({})",
            error
        )),
        _ => Notice::error(error.to_string()),
    }
}
