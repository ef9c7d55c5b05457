//! Exposure controller: the single mutation path over the active-exposure slot
//!
//! `start_exposure` claims the slot synchronously, hands the exposure to the
//! device on a detached task and returns once the device accepted it. The
//! same task then watches the hardware until the frame is downloaded or the
//! deadline passes, and delivers a sequence-tagged completion back into the
//! slot. Completions for superseded sequences are dropped.

use camera_capture::{CameraDevice, CameraError, CaptureStatus, RawFrame, SensorInfo};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::cache::{CapturedImage, ResultCache};
use crate::device::DeviceHandle;
use crate::metrics;
use crate::request::{ExposureLimits, ExposureRequest};
use crate::state::{ErrorInfo, ExposureRecord, ExposureState};
use crate::ExposureError;

/// Controller timing configuration
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Allowance on top of the exposure time before the exposure is forced to fail
    pub grace: Duration,
    /// Bound on configure + begin capture
    pub handoff_timeout: Duration,
    /// Bound on the abort issued after a missed deadline
    pub abort_timeout: Duration,
    pub min_poll_interval: Duration,
    pub max_poll_interval: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(30),
            handoff_timeout: Duration::from_secs(5),
            abort_timeout: Duration::from_secs(2),
            min_poll_interval: Duration::from_millis(10),
            max_poll_interval: Duration::from_secs(1),
        }
    }
}

impl ControllerConfig {
    /// Hardware poll cadence for an exposure of the given length
    pub fn poll_interval(&self, exposure: Duration) -> Duration {
        (exposure / 25)
            .min(self.max_poll_interval)
            .max(self.min_poll_interval)
    }
}

/// Acknowledgement of an accepted exposure
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ExposureStarted {
    pub sequence: u64,
    #[serde(rename = "status")]
    pub state: ExposureState,
}

/// Record and image read under one lock
#[derive(Debug, Clone)]
pub struct ControllerSnapshot {
    pub record: ExposureRecord,
    pub image: Option<Arc<CapturedImage>>,
}

/// Outcome delivered by the watcher
#[derive(Debug)]
pub(crate) enum Completion {
    Captured(CapturedImage),
    Failed(ExposureError),
}

#[derive(Debug, Default)]
struct Slot {
    record: ExposureRecord,
    cache: ResultCache,
}

impl Slot {
    // The state gauge is written under the slot lock so it follows transition order

    fn begin(&mut self, request: ExposureRequest, now: DateTime<Utc>) -> Result<u64, ExposureError> {
        let sequence = self.record.begin(request, now)?;
        self.cache.clear();
        metrics::record_state(ExposureState::Exposing);
        Ok(sequence)
    }

    fn complete(&mut self, image: CapturedImage, now: DateTime<Utc>) -> bool {
        if !self.record.complete(image.sequence, now) {
            return false;
        }
        self.cache.publish(image);
        metrics::record_state(ExposureState::Ready);
        true
    }

    fn fail(&mut self, sequence: u64, error: &ExposureError, now: DateTime<Utc>) -> bool {
        if !self.record.fail(sequence, ErrorInfo::new(error, now), now) {
            return false;
        }
        metrics::record_state(ExposureState::Failed);
        true
    }
}

struct Inner {
    device: DeviceHandle,
    sensor: SensorInfo,
    limits: ExposureLimits,
    config: ControllerConfig,
    slot: Mutex<Slot>,
}

/// Cloneable handle to the exposure controller
#[derive(Clone)]
pub struct ExposureController {
    inner: Arc<Inner>,
}

impl ExposureController {
    /// Open the camera and build a controller in `Idle`
    pub async fn open<D: CameraDevice>(
        device: D,
        config: ControllerConfig,
    ) -> Result<Self, ExposureError> {
        let device = DeviceHandle::new(device);
        let sensor = device
            .call_with_timeout(config.handoff_timeout, |d| d.open())
            .await?;

        info!(
            "Camera ready: {} ({}x{}, {}-bit, {})",
            sensor.name,
            sensor.max_width,
            sensor.max_height,
            sensor.bit_depth,
            sensor.bayer.map(|b| b.as_str()).unwrap_or("mono")
        );
        metrics::record_state(ExposureState::Idle);

        Ok(Self {
            inner: Arc::new(Inner {
                device,
                limits: ExposureLimits::from(&sensor),
                sensor,
                config,
                slot: Mutex::new(Slot::default()),
            }),
        })
    }

    pub fn sensor(&self) -> &SensorInfo {
        &self.inner.sensor
    }

    pub fn limits(&self) -> &ExposureLimits {
        &self.inner.limits
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.inner.config
    }

    /// Start an exposure.
    ///
    /// Rejections (invalid parameters, busy) return immediately and leave the
    /// record untouched. Otherwise returns once the device accepted the
    /// exposure, or with the device error that made the exposure fail.
    pub async fn start_exposure(
        &self,
        request: ExposureRequest,
    ) -> Result<ExposureStarted, ExposureError> {
        let exposure = match self
            .inner
            .limits
            .validate(&request)
            .and_then(|_| request.duration())
            .and_then(|exposure| self.inner.deadline(Instant::now(), exposure).map(|_| exposure))
        {
            Ok(exposure) => exposure,
            Err(e) => {
                debug!("Exposure rejected: {}", e);
                metrics::record_rejected(e.kind());
                return Err(e);
            }
        };

        let started_at = Utc::now();
        let sequence = match self.inner.lock_slot().begin(request.clone(), started_at) {
            Ok(sequence) => sequence,
            Err(e) => {
                debug!("Exposure rejected: {}", e);
                metrics::record_rejected(e.kind());
                return Err(e);
            }
        };

        info!(
            "Exposure #{} started: {}s gain={} offset={}{}",
            sequence,
            request.exposure_seconds,
            request.gain,
            request.offset,
            if request.is_dark { " (dark)" } else { "" }
        );
        metrics::record_started();

        let (handoff_tx, handoff_rx) = oneshot::channel();
        let inner = self.inner.clone();
        tokio::spawn(async move {
            inner
                .run_exposure(sequence, request, exposure, started_at, handoff_tx)
                .await;
        });

        match handoff_rx.await {
            Ok(Ok(())) => Ok(ExposureStarted {
                sequence,
                state: ExposureState::Exposing,
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ExposureError::Device(CameraError::Unavailable(
                "exposure task ended before hand-off".to_string(),
            ))),
        }
    }

    /// Current lifecycle record; never touches the device
    pub fn get_status(&self) -> ExposureRecord {
        self.inner.lock_slot().record.clone()
    }

    /// Image of the last successful exposure
    pub fn get_image(&self) -> Result<Arc<CapturedImage>, ExposureError> {
        self.inner
            .lock_slot()
            .cache
            .snapshot()
            .ok_or(ExposureError::NotReady)
    }

    /// Record and image taken together
    pub fn snapshot(&self) -> ControllerSnapshot {
        let slot = self.inner.lock_slot();
        ControllerSnapshot {
            record: slot.record.clone(),
            image: slot.cache.snapshot(),
        }
    }

    /// Fail any running exposure, abort it and close the camera
    pub async fn shutdown(&self) -> Result<(), ExposureError> {
        let interrupted = {
            let mut slot = self.inner.lock_slot();
            let sequence = slot.record.sequence;
            let error = ExposureError::Device(CameraError::Unavailable(
                "server shutting down".to_string(),
            ));
            slot.record.is_current(sequence) && slot.fail(sequence, &error, Utc::now())
        };

        let timeout = self.inner.config.abort_timeout;
        if interrupted {
            warn!("Shutting down during an exposure, aborting");
            if let Err(e) = self
                .inner
                .device
                .call_with_timeout(timeout, |d| d.abort())
                .await
            {
                warn!("Abort on shutdown failed: {}", e);
            }
        }

        self.inner
            .device
            .call_with_timeout(timeout, |d| d.close())
            .await?;
        info!("Camera closed");
        Ok(())
    }
}

impl Inner {
    fn lock_slot(&self) -> MutexGuard<'_, Slot> {
        // Critical sections never panic; a poisoned lock still holds a valid slot
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Time limit and watcher deadline for an exposure started at `clock`
    fn deadline(
        &self,
        clock: Instant,
        exposure: Duration,
    ) -> Result<(Duration, Instant), ExposureError> {
        exposure
            .checked_add(self.config.grace)
            .and_then(|limit| clock.checked_add(limit).map(|deadline| (limit, deadline)))
            .ok_or_else(|| {
                ExposureError::InvalidParameters(format!(
                    "exposure of {}s is too long to schedule",
                    exposure.as_secs_f64()
                ))
            })
    }

    async fn run_exposure(
        self: Arc<Self>,
        sequence: u64,
        request: ExposureRequest,
        exposure: Duration,
        started_at: DateTime<Utc>,
        handoff: oneshot::Sender<Result<(), ExposureError>>,
    ) {
        let clock = Instant::now();
        let settings = request.settings();
        let is_dark = request.is_dark;

        let accepted = self
            .device
            .call_with_timeout(self.config.handoff_timeout, move |d| {
                d.configure(&settings)?;
                d.begin_capture(exposure, is_dark)
            })
            .await;

        let accepted = match accepted {
            Err(CameraError::Timeout(after)) => {
                // The begin call may still land after we gave up on it
                match self
                    .device
                    .call_with_timeout(self.config.abort_timeout, |d| d.abort())
                    .await
                {
                    Ok(()) => Err(ExposureError::Device(CameraError::Timeout(after))),
                    Err(e) => {
                        warn!("Abort after hand-off timeout failed: {}", e);
                        Err(ExposureError::AbortFailed {
                            after,
                            reason: e.to_string(),
                        })
                    }
                }
            }
            Err(e) => Err(ExposureError::Device(e)),
            Ok(()) => match self.deadline(clock, exposure) {
                Ok(deadline) => Ok(deadline),
                Err(e) => {
                    if let Err(abort) = self
                        .device
                        .call_with_timeout(self.config.abort_timeout, |d| d.abort())
                        .await
                    {
                        warn!("Abort of unschedulable exposure failed: {}", abort);
                    }
                    Err(e)
                }
            },
        };

        let (limit, deadline) = match accepted {
            Ok(deadline) => deadline,
            Err(error) => {
                self.finish(sequence, Completion::Failed(error.clone()), clock.elapsed());
                let _ = handoff.send(Err(error));
                return;
            }
        };
        // The caller may have gone away; the exposure runs regardless
        let _ = handoff.send(Ok(()));

        let completion =
            match tokio::time::timeout_at(deadline, self.await_completion(exposure)).await {
                Ok(Ok(frame)) => Completion::Captured(CapturedImage {
                    sequence,
                    frame,
                    request,
                    instrument: self.sensor.name.clone(),
                    bayer: self.sensor.bayer,
                    started_at,
                    captured_at: Utc::now(),
                }),
                Ok(Err(e)) => Completion::Failed(ExposureError::Device(e)),
                Err(_) => Completion::Failed(self.abort_after(limit).await),
            };

        self.finish(sequence, completion, clock.elapsed());
    }

    /// Poll the hardware until the frame is downloaded
    async fn await_completion(&self, exposure: Duration) -> Result<RawFrame, CameraError> {
        let interval = self.config.poll_interval(exposure);
        loop {
            match self.device.call(|d| d.poll_capture()).await? {
                CaptureStatus::Working => tokio::time::sleep(interval).await,
                CaptureStatus::Success => return self.device.call(|d| d.read_frame()).await,
                CaptureStatus::Failed => {
                    return Err(CameraError::Capture(
                        "camera reported exposure failure".to_string(),
                    ))
                }
                CaptureStatus::Idle => {
                    return Err(CameraError::Capture(
                        "exposure ended without a frame".to_string(),
                    ))
                }
            }
        }
    }

    async fn abort_after(&self, after: Duration) -> ExposureError {
        match self
            .device
            .call_with_timeout(self.config.abort_timeout, |d| d.abort())
            .await
        {
            Ok(()) => ExposureError::Timeout(after),
            Err(e) => ExposureError::AbortFailed {
                after,
                reason: e.to_string(),
            },
        }
    }

    /// Apply a completion to the slot. Returns false for superseded sequences.
    fn finish(&self, sequence: u64, completion: Completion, elapsed: Duration) -> bool {
        let now = Utc::now();
        let (applied, outcome) = {
            let mut slot = self.lock_slot();
            match completion {
                Completion::Captured(image) => (slot.complete(image, now), Ok(())),
                Completion::Failed(e) => (slot.fail(sequence, &e, now), Err(e)),
            }
        };

        if !applied {
            debug!("Discarding completion of superseded exposure #{}", sequence);
            metrics::record_stale();
            return false;
        }

        match outcome {
            Ok(()) => {
                info!("Exposure #{} ready after {:.3}s", sequence, elapsed.as_secs_f64());
                metrics::record_finished(None, elapsed);
            }
            Err(e) => {
                error!("Exposure #{} failed: {}", sequence, e);
                metrics::record_finished(Some(e.kind()), elapsed);
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use camera_capture::{
        CaptureSettings, ControlRange, SimulatedBehavior, SimulatedCamera, SimulatedConfig,
        SimulatedControl,
    };
    use metrics_exporter_prometheus::PrometheusBuilder;

    fn fast_config() -> ControllerConfig {
        ControllerConfig {
            grace: Duration::from_millis(200),
            handoff_timeout: Duration::from_millis(500),
            abort_timeout: Duration::from_millis(200),
            min_poll_interval: Duration::from_millis(2),
            max_poll_interval: Duration::from_millis(20),
        }
    }

    async fn controller() -> (ExposureController, SimulatedControl) {
        let (camera, control) = SimulatedCamera::new(SimulatedConfig::tiny());
        let controller = ExposureController::open(camera, fast_config()).await.unwrap();
        (controller, control)
    }

    async fn wait_until_settled(controller: &ExposureController) -> ExposureRecord {
        for _ in 0..500 {
            let record = controller.get_status();
            if record.state != ExposureState::Exposing {
                return record;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("exposure never settled");
    }

    #[tokio::test]
    async fn test_exposure_produces_image() {
        let (controller, control) = controller().await;
        let request = ExposureRequest::new(3.0, 50, 10);

        let started = controller.start_exposure(request.clone()).await.unwrap();
        assert_eq!(started.sequence, 1);
        assert_eq!(controller.get_status().state, ExposureState::Exposing);
        assert_eq!(controller.get_image(), Err(ExposureError::NotReady));

        let busy = controller.start_exposure(ExposureRequest::new(1.0, 0, 0)).await;
        assert_eq!(busy, Err(ExposureError::Busy));
        assert_eq!(controller.get_status().request, Some(request.clone()));

        control.complete_now();
        let record = wait_until_settled(&controller).await;
        assert_eq!(record.state, ExposureState::Ready);
        assert!(record.completed_at.is_some());

        let image = controller.get_image().unwrap();
        let settings = CaptureSettings {
            gain: 50,
            offset: 10,
            wb_r: None,
            wb_b: None,
        };
        assert_eq!(
            image.pixel_buffer(),
            SimulatedCamera::synthesize(&SimulatedConfig::tiny(), &settings).as_slice()
        );
        assert_eq!(image.request, request);
        assert_eq!(image.sequence, 1);
        assert_eq!(image.instrument, "Simulated ASI");
        assert_eq!(control.last_settings(), Some(settings));
    }

    #[tokio::test]
    async fn test_invalid_request_leaves_state_unchanged() {
        let (controller, control) = controller().await;

        let result = controller
            .start_exposure(ExposureRequest::new(-1.0, 50, 10))
            .await;
        assert!(matches!(result, Err(ExposureError::InvalidParameters(_))));
        assert_eq!(controller.get_status(), ExposureRecord::default());
        assert_eq!(control.begin_calls(), 0);
    }

    #[tokio::test]
    async fn test_hung_device_times_out_and_frees_slot() {
        let (controller, control) = controller().await;
        control.set_behavior(SimulatedBehavior::Hang);

        controller
            .start_exposure(ExposureRequest::new(0.01, 50, 10))
            .await
            .unwrap();
        let record = wait_until_settled(&controller).await;
        assert_eq!(record.state, ExposureState::Failed);
        assert_eq!(record.error.unwrap().kind, ErrorKind::Timeout);
        assert_eq!(control.abort_calls(), 1);

        control.set_behavior(SimulatedBehavior::Complete);
        let next = controller
            .start_exposure(ExposureRequest::new(0.01, 50, 10))
            .await
            .unwrap();
        assert_eq!(next.sequence, 2);
        assert_eq!(wait_until_settled(&controller).await.state, ExposureState::Ready);
    }

    #[tokio::test]
    async fn test_failed_abort_is_reported() {
        let (controller, control) = controller().await;
        control.set_behavior(SimulatedBehavior::Hang);
        control.set_abort_fails(true);

        controller
            .start_exposure(ExposureRequest::new(0.01, 50, 10))
            .await
            .unwrap();
        let record = wait_until_settled(&controller).await;
        assert_eq!(record.state, ExposureState::Failed);
        assert_eq!(record.error.unwrap().kind, ErrorKind::AbortFailed);
    }

    #[tokio::test]
    async fn test_late_completion_is_discarded() {
        let (controller, control) = controller().await;
        control.set_behavior(SimulatedBehavior::Hang);
        controller
            .start_exposure(ExposureRequest::new(0.01, 50, 10))
            .await
            .unwrap();
        wait_until_settled(&controller).await;

        let late = CapturedImage {
            sequence: 1,
            frame: RawFrame::new(vec![0u8; 16 * 8 * 2], 16, 8, 16).unwrap(),
            request: ExposureRequest::new(0.01, 50, 10),
            instrument: "late".to_string(),
            bayer: None,
            started_at: Utc::now(),
            captured_at: Utc::now(),
        };
        let before = controller.get_status();
        assert!(!controller.inner.finish(
            1,
            Completion::Captured(late),
            Duration::ZERO
        ));
        assert_eq!(controller.get_status(), before);
        assert!(controller.get_image().is_err());

        controller
            .start_exposure(ExposureRequest::new(60.0, 50, 10))
            .await
            .unwrap();
        assert!(!controller.inner.finish(
            1,
            Completion::Failed(ExposureError::Timeout(Duration::ZERO)),
            Duration::ZERO
        ));
        assert_eq!(controller.get_status().state, ExposureState::Exposing);
    }

    #[tokio::test]
    async fn test_new_start_clears_previous_image() {
        let (controller, control) = controller().await;
        controller
            .start_exposure(ExposureRequest::new(0.01, 50, 10))
            .await
            .unwrap();
        wait_until_settled(&controller).await;
        let held = controller.get_image().unwrap();
        let bytes = held.pixel_buffer().to_vec();

        control.set_behavior(SimulatedBehavior::Hang);
        controller
            .start_exposure(ExposureRequest::new(60.0, 100, 20))
            .await
            .unwrap();

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.record.state, ExposureState::Exposing);
        assert!(snapshot.image.is_none());
        assert!(snapshot.record.error.is_none());
        assert_eq!(held.pixel_buffer(), bytes.as_slice());
    }

    #[tokio::test]
    async fn test_device_faults_fail_exposure() {
        for behavior in [
            SimulatedBehavior::FailExposure,
            SimulatedBehavior::Disconnect,
            SimulatedBehavior::FailDownload,
        ] {
            let (controller, control) = controller().await;
            control.set_behavior(behavior);
            controller
                .start_exposure(ExposureRequest::new(0.01, 50, 10))
                .await
                .unwrap();

            let record = wait_until_settled(&controller).await;
            assert_eq!(record.state, ExposureState::Failed, "{:?}", behavior);
            assert_eq!(record.error.unwrap().kind, ErrorKind::Device);
            assert!(controller.get_image().is_err());
        }
    }

    #[tokio::test]
    async fn test_rejected_handoff_fails_start() {
        let (controller, control) = controller().await;
        control.set_behavior(SimulatedBehavior::RejectBegin);

        let result = controller
            .start_exposure(ExposureRequest::new(1.0, 50, 10))
            .await;
        assert!(matches!(
            result,
            Err(ExposureError::Device(CameraError::Rejected(_)))
        ));

        let record = controller.get_status();
        assert_eq!(record.state, ExposureState::Failed);
        assert_eq!(record.sequence, 1);
        assert_eq!(record.error.unwrap().kind, ErrorKind::Device);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_starts_admit_one() {
        let (controller, _control) = controller().await;

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let controller = controller.clone();
                tokio::spawn(async move {
                    controller
                        .start_exposure(ExposureRequest::new(60.0, 50, 10))
                        .await
                })
            })
            .collect();

        let mut accepted = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(e) => assert_eq!(e, ExposureError::Busy),
            }
        }
        assert_eq!(accepted, 1);
        assert_eq!(controller.get_status().sequence, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_readers_see_consistent_snapshots() {
        let (controller, _control) = controller().await;

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let controller = controller.clone();
                tokio::spawn(async move {
                    for _ in 0..2000 {
                        let snapshot = controller.snapshot();
                        assert!(snapshot.record.is_consistent());
                        match (&snapshot.image, snapshot.record.state) {
                            (Some(image), ExposureState::Ready) => {
                                assert_eq!(image.sequence, snapshot.record.sequence)
                            }
                            (None, ExposureState::Ready) => panic!("ready without image"),
                            (Some(_), state) => panic!("image present while {:?}", state),
                            (None, _) => {}
                        }
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        for _ in 0..5 {
            controller
                .start_exposure(ExposureRequest::new(0.005, 50, 10))
                .await
                .unwrap();
            wait_until_settled(&controller).await;
        }
        for reader in readers {
            reader.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_shutdown_aborts_running_exposure() {
        let (controller, control) = controller().await;
        controller
            .start_exposure(ExposureRequest::new(60.0, 50, 10))
            .await
            .unwrap();

        controller.shutdown().await.unwrap();
        let record = controller.get_status();
        assert_eq!(record.state, ExposureState::Failed);
        assert_eq!(control.abort_calls(), 1);
    }

    /// Simulated camera with adjustable quirks
    struct QuirkyCamera {
        inner: SimulatedCamera,
        unbounded_exposure: bool,
        configure_delay: Duration,
    }

    impl QuirkyCamera {
        fn new() -> (Self, SimulatedControl) {
            let (inner, control) = SimulatedCamera::new(SimulatedConfig::tiny());
            let camera = Self {
                inner,
                unbounded_exposure: false,
                configure_delay: Duration::ZERO,
            };
            (camera, control)
        }
    }

    impl CameraDevice for QuirkyCamera {
        fn open(&mut self) -> Result<SensorInfo, CameraError> {
            let mut info = self.inner.open()?;
            if self.unbounded_exposure {
                info.exposure_us = ControlRange::new(0, 0, 0);
            }
            Ok(info)
        }

        fn configure(&mut self, settings: &CaptureSettings) -> Result<(), CameraError> {
            std::thread::sleep(self.configure_delay);
            self.inner.configure(settings)
        }

        fn begin_capture(&mut self, exposure: Duration, is_dark: bool) -> Result<(), CameraError> {
            self.inner.begin_capture(exposure, is_dark)
        }

        fn poll_capture(&mut self) -> Result<CaptureStatus, CameraError> {
            self.inner.poll_capture()
        }

        fn read_frame(&mut self) -> Result<RawFrame, CameraError> {
            self.inner.read_frame()
        }

        fn abort(&mut self) -> Result<(), CameraError> {
            self.inner.abort()
        }

        fn close(&mut self) -> Result<(), CameraError> {
            self.inner.close()
        }
    }

    #[tokio::test]
    async fn test_unschedulable_exposure_is_rejected() {
        let (mut camera, control) = QuirkyCamera::new();
        camera.unbounded_exposure = true;
        let controller = ExposureController::open(camera, fast_config()).await.unwrap();
        assert_eq!(controller.limits().exposure_us.max, 0);

        let result = controller
            .start_exposure(ExposureRequest::new(1e19, 50, 10))
            .await;
        assert!(matches!(result, Err(ExposureError::InvalidParameters(_))));
        assert_eq!(controller.get_status(), ExposureRecord::default());
        assert_eq!(control.begin_calls(), 0);

        let next = controller
            .start_exposure(ExposureRequest::new(0.01, 50, 10))
            .await
            .unwrap();
        assert_eq!(next.sequence, 1);
        assert_eq!(wait_until_settled(&controller).await.state, ExposureState::Ready);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_abort_failure_after_handoff_timeout() {
        let (mut camera, _control) = QuirkyCamera::new();
        camera.configure_delay = Duration::from_millis(400);
        let config = ControllerConfig {
            handoff_timeout: Duration::from_millis(100),
            abort_timeout: Duration::from_millis(50),
            ..fast_config()
        };
        let controller = ExposureController::open(camera, config).await.unwrap();

        let result = controller
            .start_exposure(ExposureRequest::new(0.01, 50, 10))
            .await;
        assert!(matches!(result, Err(ExposureError::AbortFailed { .. })));

        let record = controller.get_status();
        assert_eq!(record.state, ExposureState::Failed);
        assert_eq!(record.error.unwrap().kind, ErrorKind::AbortFailed);
    }

    #[test]
    fn test_metrics_follow_exposure_outcomes() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let record = ::metrics::with_local_recorder(&recorder, || {
            runtime.block_on(async {
                let (controller, control) = controller().await;
                for behavior in [
                    SimulatedBehavior::Complete,
                    SimulatedBehavior::FailExposure,
                    SimulatedBehavior::Hang,
                ] {
                    control.set_behavior(behavior);
                    controller
                        .start_exposure(ExposureRequest::new(0.01, 50, 10))
                        .await
                        .unwrap();
                    wait_until_settled(&controller).await;
                }
                let invalid = ExposureRequest::new(-1.0, 50, 10);
                assert!(controller.start_exposure(invalid).await.is_err());
                controller.get_status()
            })
        });
        assert_eq!(record.state, ExposureState::Failed);

        let output = handle.render();
        assert!(output.contains("camera_exposures_started_total 3"));
        assert!(output.contains("camera_exposures_succeeded_total 1"));
        assert!(output.contains("camera_exposures_failed_total 1"));
        assert!(output.contains("camera_exposures_timed_out_total 1"));
        assert!(output
            .contains("camera_exposures_rejected_total{reason=\"validation\"} 1"));
        assert!(output.contains("camera_last_exposure_duration_seconds"));
        assert!(output.contains("camera_exposure_state 3"));
    }

    #[test]
    fn test_poll_interval_is_clamped() {
        let config = ControllerConfig::default();
        assert_eq!(
            config.poll_interval(Duration::from_secs(3)),
            Duration::from_millis(120)
        );
        assert_eq!(
            config.poll_interval(Duration::from_millis(100)),
            Duration::from_millis(10)
        );
        assert_eq!(
            config.poll_interval(Duration::from_secs(100)),
            Duration::from_secs(1)
        );
    }
}
