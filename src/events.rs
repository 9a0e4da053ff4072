//! Lifecycle notifications published by the package manager.
//!
//! Observers are injected into [`PackageManager`](crate::application::PackageManager)
//! and called synchronously after each state change. They only observe;
//! nothing an observer does can alter the outcome of an operation.

use log::{info, warn};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Mutex;
use tokio::sync::mpsc;

use crate::error::{ErrorKind, PackageError};

/// Which lifecycle script reference was checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ScriptStage {
    PostInstall,
    Uninstall,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum PackageEvent {
    #[serde(rename_all = "camelCase")]
    InstallStarted {
        package_id: String,
        version: String,
        archive: PathBuf,
    },
    #[serde(rename_all = "camelCase")]
    InstallCompleted {
        package_id: String,
        version: String,
        requires_restart: bool,
    },
    /// `package_id` is the archive file stem when the manifest could not be
    /// read.
    #[serde(rename_all = "camelCase")]
    InstallFailed {
        package_id: String,
        kind: ErrorKind,
        error: String,
    },
    #[serde(rename_all = "camelCase")]
    UpdateCompleted {
        package_id: String,
        old_version: String,
        new_version: String,
        changes: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    UpdateFailed {
        package_id: String,
        kind: ErrorKind,
        error: String,
    },
    #[serde(rename_all = "camelCase")]
    UninstallCompleted { package_id: String, version: String },
    #[serde(rename_all = "camelCase")]
    UninstallFailed {
        package_id: String,
        kind: ErrorKind,
        error: String,
    },
    #[serde(rename_all = "camelCase")]
    LifecycleScriptChecked {
        package_id: String,
        stage: ScriptStage,
        script: String,
        present: bool,
    },
}

impl PackageEvent {
    pub fn package_id(&self) -> &str {
        match self {
            PackageEvent::InstallStarted { package_id, .. }
            | PackageEvent::InstallCompleted { package_id, .. }
            | PackageEvent::InstallFailed { package_id, .. }
            | PackageEvent::UpdateCompleted { package_id, .. }
            | PackageEvent::UpdateFailed { package_id, .. }
            | PackageEvent::UninstallCompleted { package_id, .. }
            | PackageEvent::UninstallFailed { package_id, .. }
            | PackageEvent::LifecycleScriptChecked { package_id, .. } => package_id,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            PackageEvent::InstallStarted { .. } => "install_started",
            PackageEvent::InstallCompleted { .. } => "install_completed",
            PackageEvent::InstallFailed { .. } => "install_failed",
            PackageEvent::UpdateCompleted { .. } => "update_completed",
            PackageEvent::UpdateFailed { .. } => "update_failed",
            PackageEvent::UninstallCompleted { .. } => "uninstall_completed",
            PackageEvent::UninstallFailed { .. } => "uninstall_failed",
            PackageEvent::LifecycleScriptChecked { .. } => "lifecycle_script_checked",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            PackageEvent::InstallFailed { .. }
                | PackageEvent::UpdateFailed { .. }
                | PackageEvent::UninstallFailed { .. }
        )
    }

    pub(crate) fn install_failed(package_id: &str, error: &PackageError) -> Self {
        PackageEvent::InstallFailed {
            package_id: package_id.to_string(),
            kind: error.kind(),
            error: format!("{:#}", error),
        }
    }

    pub(crate) fn update_failed(package_id: &str, error: &PackageError) -> Self {
        PackageEvent::UpdateFailed {
            package_id: package_id.to_string(),
            kind: error.kind(),
            error: format!("{:#}", error),
        }
    }

    pub(crate) fn uninstall_failed(package_id: &str, error: &PackageError) -> Self {
        PackageEvent::UninstallFailed {
            package_id: package_id.to_string(),
            kind: error.kind(),
            error: format!("{:#}", error),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
pub trait PackageObserver: Send + Sync {
    fn notify(&self, event: &PackageEvent);
}

/// Writes every event to the log.
#[derive(Debug, Default)]
pub struct LoggingObserver;

impl PackageObserver for LoggingObserver {
    fn notify(&self, event: &PackageEvent) {
        match event {
            PackageEvent::InstallFailed { error, .. }
            | PackageEvent::UpdateFailed { error, .. }
            | PackageEvent::UninstallFailed { error, .. } => {
                warn!("[{}] {}: {}", event.event_type(), event.package_id(), error)
            }
            PackageEvent::LifecycleScriptChecked {
                script,
                present: false,
                ..
            } => warn!(
                "[{}] {}: script {} not found",
                event.event_type(),
                event.package_id(),
                script
            ),
            _ => info!("[{}] {}", event.event_type(), event.package_id()),
        }
    }
}

/// Forwards events onto an unbounded channel. Events sent after the
/// receiver is dropped are discarded.
#[derive(Debug)]
pub struct ChannelObserver {
    sender: mpsc::UnboundedSender<PackageEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PackageEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl PackageObserver for ChannelObserver {
    fn notify(&self, event: &PackageEvent) {
        let _ = self.sender.send(event.clone());
    }
}

/// Keeps every event in memory, in order.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<PackageEvent>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<PackageEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl PackageObserver for RecordingObserver {
    fn notify(&self, event: &PackageEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());
    }
}
