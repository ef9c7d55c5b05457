//! Exposure lifecycle state machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ErrorKind, ExposureError, ExposureRequest};

/// Controller-wide exposure state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExposureState {
    #[default]
    Idle,
    Exposing,
    Ready,
    Failed,
}

impl ExposureState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExposureState::Idle => "idle",
            ExposureState::Exposing => "exposing",
            ExposureState::Ready => "ready",
            ExposureState::Failed => "failed",
        }
    }

    /// Numeric encoding for the state gauge
    pub fn gauge_value(&self) -> f64 {
        match self {
            ExposureState::Idle => 0.0,
            ExposureState::Exposing => 1.0,
            ExposureState::Ready => 2.0,
            ExposureState::Failed => 3.0,
        }
    }
}

/// Failure detail kept in the record while `Failed`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl ErrorInfo {
    pub fn new(error: &ExposureError, at: DateTime<Utc>) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
            at,
        }
    }
}

/// The single mutable lifecycle record.
///
/// `error` is set iff `state == Failed`. `sequence` tags the exposure that
/// produced the current state and only ever grows.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExposureRecord {
    pub state: ExposureState,
    pub sequence: u64,
    pub request: Option<ExposureRequest>,
    pub error: Option<ErrorInfo>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ExposureRecord {
    /// Idle | Ready | Failed -> Exposing. Returns the new sequence number.
    pub fn begin(
        &mut self,
        request: ExposureRequest,
        now: DateTime<Utc>,
    ) -> Result<u64, ExposureError> {
        if self.state == ExposureState::Exposing {
            return Err(ExposureError::Busy);
        }

        self.sequence += 1;
        self.state = ExposureState::Exposing;
        self.request = Some(request);
        self.error = None;
        self.started_at = Some(now);
        self.completed_at = None;
        Ok(self.sequence)
    }

    /// Check if `sequence` is the exposure currently running
    pub fn is_current(&self, sequence: u64) -> bool {
        self.state == ExposureState::Exposing && self.sequence == sequence
    }

    /// Exposing -> Ready for the current sequence only
    pub fn complete(&mut self, sequence: u64, now: DateTime<Utc>) -> bool {
        if !self.is_current(sequence) {
            return false;
        }
        self.state = ExposureState::Ready;
        self.completed_at = Some(now);
        true
    }

    /// Exposing -> Failed for the current sequence only
    pub fn fail(&mut self, sequence: u64, error: ErrorInfo, now: DateTime<Utc>) -> bool {
        if !self.is_current(sequence) {
            return false;
        }
        self.state = ExposureState::Failed;
        self.error = Some(error);
        self.completed_at = Some(now);
        true
    }

    /// Check the record's own invariants
    pub fn is_consistent(&self) -> bool {
        let error_ok = self.error.is_some() == (self.state == ExposureState::Failed);
        let request_ok = self.request.is_some() == (self.state != ExposureState::Idle);
        let sequence_ok = (self.sequence == 0) == (self.state == ExposureState::Idle);
        error_ok && request_ok && sequence_ok
    }
}
