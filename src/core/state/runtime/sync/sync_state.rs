use serde::Serialize;
use thiserror::Error;

/// What a toggle request did to one application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTransition {
    Started,
    AlreadyOn,
    Stopped,
    AlreadyOff,
}

impl SyncTransition {
    pub fn message(&self, app: &str) -> String {
        match self {
            Self::Started => format!("sync turned on for {app}"),
            Self::AlreadyOn => format!("sync already on for {app}"),
            Self::Stopped => format!("sync turned off for {app}"),
            Self::AlreadyOff => format!("sync already off for {app}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub app: String,
    pub transition: SyncTransition,
    pub message: String,
}

impl SyncReport {
    pub fn new(app: &str, transition: SyncTransition) -> Self {
        Self {
            app: app.to_string(),
            transition,
            message: transition.message(app),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("unknown application '{0}'")]
    UnknownApp(String),
}
