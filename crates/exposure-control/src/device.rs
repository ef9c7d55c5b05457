//! Blocking device access from async code

use camera_capture::{CameraDevice, CameraError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Shared owner of the camera.
///
/// All device calls run on the blocking pool and are serialized by the
/// mutex; the SDK is not reentrant.
#[derive(Clone)]
pub(crate) struct DeviceHandle {
    device: Arc<Mutex<Box<dyn CameraDevice>>>,
}

impl DeviceHandle {
    pub(crate) fn new<D: CameraDevice>(device: D) -> Self {
        Self {
            device: Arc::new(Mutex::new(Box::new(device))),
        }
    }

    /// Run `f` against the device on a blocking thread
    pub(crate) async fn call<T, F>(&self, f: F) -> Result<T, CameraError>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn CameraDevice) -> Result<T, CameraError> + Send + 'static,
    {
        let device = self.device.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = device
                .lock()
                .map_err(|e| CameraError::Unavailable(format!("Lock error: {}", e)))?;
            f(&mut **guard)
        })
        .await
        .map_err(|e| CameraError::Unavailable(format!("Device task failed: {}", e)))?
    }

    /// Like [`call`](Self::call) but gives up after `timeout`.
    ///
    /// The blocking call itself cannot be cancelled; it keeps the device lock
    /// until the SDK returns.
    pub(crate) async fn call_with_timeout<T, F>(
        &self,
        timeout: Duration,
        f: F,
    ) -> Result<T, CameraError>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn CameraDevice) -> Result<T, CameraError> + Send + 'static,
    {
        match tokio::time::timeout(timeout, self.call(f)).await {
            Ok(result) => result,
            Err(_) => Err(CameraError::Timeout(timeout)),
        }
    }
}
