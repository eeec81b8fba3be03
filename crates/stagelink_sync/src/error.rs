//! Error types for the synchronization engine.

use std::collections::HashSet;

use stagelink_core::{PrimPath, StageError};
use thiserror::Error;

use crate::world::ComponentId;

/// Errors raised while translating or reconciling a stage.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Failed to build asset for {path}: {reason}")]
    AssetBuild { path: PrimPath, reason: String },

    #[error("Task chain for {0} aborted")]
    ChainAborted(PrimPath),

    #[error("No component with id {0:?}")]
    UnknownComponent(ComponentId),

    #[error("The stage has been closed")]
    StageClosed,

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("Stage error: {0}")]
    Stage(#[from] StageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Settings JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to start worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

/// Result type for synchronization operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors collected over one pass and reported together.
///
/// Errors with the same message are kept once.
#[derive(Debug, Default)]
pub struct ErrorLog {
    errors: Vec<SyncError>,
    seen: HashSet<String>,
}

impl ErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error unless an identical message is already recorded.
    pub fn push(&mut self, error: SyncError) {
        if self.seen.insert(error.to_string()) {
            self.errors.push(error);
        }
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[SyncError] {
        &self.errors
    }

    /// Log everything collected as one report and return the messages.
    pub fn flush(&mut self, context: &str) -> Vec<String> {
        self.seen.clear();
        let messages: Vec<String> = self.errors.drain(..).map(|e| e.to_string()).collect();
        if !messages.is_empty() {
            log::error!(
                "{} finished with {} error(s):\n  {}",
                context,
                messages.len(),
                messages.join("\n  ")
            );
        }
        messages
    }
}
