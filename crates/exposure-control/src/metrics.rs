//! Prometheus metric names and recording helpers
//!
//! Recording goes through the `metrics` facade; nothing is collected until
//! the binary installs a recorder.

use metrics::{counter, describe_counter, describe_gauge, gauge};
use std::time::Duration;

use crate::{ErrorKind, ExposureState};

pub const EXPOSURES_STARTED: &str = "camera_exposures_started_total";
pub const EXPOSURES_SUCCEEDED: &str = "camera_exposures_succeeded_total";
pub const EXPOSURES_FAILED: &str = "camera_exposures_failed_total";
pub const EXPOSURES_TIMED_OUT: &str = "camera_exposures_timed_out_total";
pub const EXPOSURES_REJECTED: &str = "camera_exposures_rejected_total";
pub const STALE_COMPLETIONS: &str = "camera_stale_completions_total";
pub const EXPOSURE_STATE: &str = "camera_exposure_state";
pub const LAST_EXPOSURE_DURATION: &str = "camera_last_exposure_duration_seconds";

/// Register descriptions with the installed recorder
pub fn describe() {
    describe_counter!(EXPOSURES_STARTED, "Exposures accepted by the controller");
    describe_counter!(EXPOSURES_SUCCEEDED, "Exposures that produced an image");
    describe_counter!(EXPOSURES_FAILED, "Exposures that ended in a device error");
    describe_counter!(
        EXPOSURES_TIMED_OUT,
        "Exposures that missed their completion deadline"
    );
    describe_counter!(EXPOSURES_REJECTED, "Start requests refused, by reason");
    describe_counter!(
        STALE_COMPLETIONS,
        "Device completions discarded because their exposure was superseded"
    );
    describe_gauge!(
        EXPOSURE_STATE,
        "Current state: 0 idle, 1 exposing, 2 ready, 3 failed"
    );
    describe_gauge!(
        LAST_EXPOSURE_DURATION,
        "Wall time of the last finished exposure in seconds"
    );
}

pub fn record_started() {
    counter!(EXPOSURES_STARTED).increment(1);
}

pub fn record_rejected(kind: ErrorKind) {
    counter!(EXPOSURES_REJECTED, "reason" => kind.as_str()).increment(1);
}

pub fn record_state(state: ExposureState) {
    gauge!(EXPOSURE_STATE).set(state.gauge_value());
}

/// Count a finished exposure by outcome
pub fn record_finished(outcome: Option<ErrorKind>, elapsed: Duration) {
    match outcome {
        None => counter!(EXPOSURES_SUCCEEDED).increment(1),
        Some(ErrorKind::Timeout) | Some(ErrorKind::AbortFailed) => {
            counter!(EXPOSURES_TIMED_OUT).increment(1)
        }
        Some(_) => counter!(EXPOSURES_FAILED).increment(1),
    }
    gauge!(LAST_EXPOSURE_DURATION).set(elapsed.as_secs_f64());
}

pub fn record_stale() {
    counter!(STALE_COMPLETIONS).increment(1);
}
