//! Exclusive ownership of the one camera stream.

use crate::capture::{self, CapturedFrame};
use crate::device::{
    label_matches, CameraDevice, CameraError, Constraints, FacingMode, MediaDevices, VideoStream,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Acquired,
    Stopped,
}

/// The currently owned stream and what it was opened for.
pub struct StreamSession<S> {
    stream: S,
    device: Option<CameraDevice>,
    facing: FacingMode,
    state: StreamState,
}

impl<S: VideoStream> StreamSession<S> {
    pub fn device_id(&self) -> &str {
        self.stream.device_id()
    }

    /// Enumerated device backing the stream, when it is in the known list.
    pub fn device(&self) -> Option<&CameraDevice> {
        self.device.as_ref()
    }

    pub fn facing(&self) -> FacingMode {
        self.facing
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Native resolution (width, height).
    pub fn resolution(&self) -> (u32, u32) {
        (self.stream.width(), self.stream.height())
    }

    fn stop(&mut self) {
        self.stream.stop();
        self.state = StreamState::Stopped;
    }
}

/// Acquires, switches and releases the camera.
///
/// At most one stream exists at a time: every acquisition path releases the
/// previous stream's tracks before opening a new one.
pub struct CameraSession<D: MediaDevices> {
    media: D,
    current: Option<StreamSession<D::Stream>>,
    facing: FacingMode,
    devices: Vec<CameraDevice>,
    cursor: usize,
}

impl<D: MediaDevices> CameraSession<D> {
    pub fn new(media: D) -> Self {
        Self {
            media,
            current: None,
            facing: FacingMode::default(),
            devices: Vec::new(),
            cursor: 0,
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|s| s.state == StreamState::Acquired && s.stream.is_live())
    }

    /// Facing mode of the last successful acquisition.
    pub fn facing(&self) -> FacingMode {
        self.facing
    }

    /// Device list as of the last enumeration.
    pub fn devices(&self) -> &[CameraDevice] {
        &self.devices
    }

    pub fn current(&self) -> Option<&StreamSession<D::Stream>> {
        self.current.as_ref()
    }

    pub fn media(&self) -> &D {
        &self.media
    }

    /// Open a camera for `facing`, replacing any current stream.
    ///
    /// Tries, in order: the preferred device id; a device whose label names
    /// the facing; first/last device by position when several exist; an
    /// exact facing constraint; an ideal facing constraint; any camera.
    /// Only the last attempt's error is returned.
    pub async fn acquire(
        &mut self,
        facing: FacingMode,
        preferred_device: Option<&str>,
    ) -> Result<&StreamSession<D::Stream>, CameraError> {
        self.release();
        self.refresh_devices().await;

        let mut attempts: Vec<Constraints> = Vec::with_capacity(6);
        if let Some(id) = preferred_device {
            attempts.push(Constraints::Device(id.to_string()));
        }
        if let Some(dev) = self.pick_by_label(facing) {
            attempts.push(Constraints::Device(dev.id.clone()));
        } else if let Some(dev) = self.pick_by_position(facing) {
            attempts.push(Constraints::Device(dev.id.clone()));
        }
        attempts.push(Constraints::FacingExact(facing));
        attempts.push(Constraints::FacingIdeal(facing));
        attempts.push(Constraints::Any);

        let mut last_err = CameraError::NoDevices;
        for constraints in attempts {
            match self.media.open(&constraints).await {
                Ok(stream) => {
                    tracing::info!(
                        device = stream.device_id(),
                        width = stream.width(),
                        height = stream.height(),
                        %facing,
                        ?constraints,
                        "camera acquired"
                    );
                    // Labels are only exposed once permission has been granted.
                    self.refresh_devices().await;
                    self.install(stream, facing);
                    return self.current.as_ref().ok_or(CameraError::NotStreaming);
                }
                Err(e) => {
                    tracing::debug!(?constraints, error = %e, "camera constraint failed");
                    last_err = e;
                }
            }
        }

        tracing::warn!(error = %last_err, %facing, "camera acquisition failed");
        Err(last_err)
    }

    /// Toggle user/environment and re-acquire.
    pub async fn switch_facing(&mut self) -> Result<&StreamSession<D::Stream>, CameraError> {
        let next = self.facing.toggled();
        self.acquire(next, None).await
    }

    /// Cycle to the next enumerated device by explicit id.
    pub async fn next_device(&mut self) -> Result<&StreamSession<D::Stream>, CameraError> {
        if self.devices.is_empty() {
            self.refresh_devices().await;
        }
        if self.devices.is_empty() {
            return Err(CameraError::NoDevices);
        }

        self.cursor = (self.cursor + 1) % self.devices.len();
        let target = self.devices[self.cursor].clone();

        self.release();
        let stream = self.media.open(&Constraints::Device(target.id.clone())).await?;
        tracing::info!(device = %target.id, label = %target.label, "switched to device");

        let facing = if target.facing.satisfies(FacingMode::Environment) {
            FacingMode::Environment
        } else if target.facing.satisfies(FacingMode::User) {
            FacingMode::User
        } else {
            self.facing
        };
        self.install(stream, facing);
        self.current.as_ref().ok_or(CameraError::NotStreaming)
    }

    /// Stop every track of the current stream. Safe to call when idle.
    pub fn release(&mut self) {
        if let Some(mut session) = self.current.take() {
            let device = session.device_id().to_string();
            session.stop();
            tracing::info!(device = %device, "camera released");
        }
    }

    /// Capture a frame from the current stream.
    pub fn capture(&mut self, mirror: bool) -> Result<CapturedFrame, CameraError> {
        let session = self.current.as_mut().ok_or(CameraError::NotStreaming)?;
        capture::capture(&mut session.stream, mirror)
    }

    async fn refresh_devices(&mut self) {
        match self.media.enumerate().await {
            Ok(devices) => {
                tracing::debug!(count = devices.len(), "enumerated video devices");
                self.devices = devices;
            }
            Err(e) => tracing::debug!(error = %e, "device enumeration failed"),
        }
    }

    fn pick_by_label(&self, facing: FacingMode) -> Option<&CameraDevice> {
        self.devices.iter().find(|d| label_matches(&d.label, facing))
    }

    /// Without usable labels, phones list the front camera first and the back camera last.
    fn pick_by_position(&self, facing: FacingMode) -> Option<&CameraDevice> {
        if self.devices.len() < 2 {
            return None;
        }
        match facing {
            FacingMode::User => self.devices.first(),
            FacingMode::Environment => self.devices.last(),
        }
    }

    fn install(&mut self, stream: D::Stream, facing: FacingMode) {
        let device = self.devices.iter().find(|d| d.id == stream.device_id()).cloned();
        if let Some(pos) = self.devices.iter().position(|d| d.id == stream.device_id()) {
            self.cursor = pos;
        }
        self.facing = facing;
        self.current = Some(StreamSession {
            stream,
            device,
            facing,
            state: StreamState::Acquired,
        });
    }
}

impl<D: MediaDevices> Drop for CameraSession<D> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::{SyntheticCamera, SyntheticDevices};

    fn phone() -> SyntheticDevices {
        SyntheticDevices::new(vec![
            SyntheticCamera::new("cam-front", "Front Camera", 64, 48),
            SyntheticCamera::new("cam-back", "Back Camera", 80, 60),
        ])
    }

    #[tokio::test]
    async fn test_acquire_prefers_label_match() {
        let media = phone();
        media.grant_permission();
        let mut session = CameraSession::new(media.clone());

        let s = session.acquire(FacingMode::Environment, None).await.unwrap();
        assert_eq!(s.device_id(), "cam-back");
        assert_eq!(s.resolution(), (80, 60));
        assert_eq!(media.active_tracks(), 1);
    }

    #[tokio::test]
    async fn test_acquire_without_labels_uses_position() {
        // Labels are blank before permission is granted.
        let media = phone();
        let mut session = CameraSession::new(media.clone());

        let s = session.acquire(FacingMode::Environment, None).await.unwrap();
        assert_eq!(s.device_id(), "cam-back");
        // Labels are populated after the grant.
        assert!(session.devices().iter().all(|d| !d.label.is_empty()));
    }

    #[tokio::test]
    async fn test_acquire_falls_back_to_any_device() {
        let media = SyntheticDevices::new(vec![SyntheticCamera::new(
            "video0",
            "Integrated Webcam",
            32,
            24,
        )]);
        let mut session = CameraSession::new(media.clone());

        let s = session.acquire(FacingMode::Environment, None).await.unwrap();
        assert_eq!(s.device_id(), "video0");
        assert_eq!(s.facing(), FacingMode::Environment);
    }

    #[tokio::test]
    async fn test_preferred_device_wins() {
        let media = phone();
        media.grant_permission();
        let mut session = CameraSession::new(media.clone());

        let s = session.acquire(FacingMode::Environment, Some("cam-front")).await.unwrap();
        assert_eq!(s.device_id(), "cam-front");
    }

    #[tokio::test]
    async fn test_reacquire_never_leaks_tracks() {
        let media = phone();
        let mut session = CameraSession::new(media.clone());

        session.acquire(FacingMode::User, None).await.unwrap();
        session.acquire(FacingMode::User, None).await.unwrap();
        session.switch_facing().await.unwrap();
        assert_eq!(media.active_tracks(), 1);
        assert_eq!(session.facing(), FacingMode::Environment);
    }

    #[tokio::test]
    async fn test_switch_facing_toggles_device() {
        let media = phone();
        media.grant_permission();
        let mut session = CameraSession::new(media.clone());

        session.acquire(FacingMode::User, None).await.unwrap();
        let s = session.switch_facing().await.unwrap();
        assert_eq!(s.device_id(), "cam-back");
        let s = session.switch_facing().await.unwrap();
        assert_eq!(s.device_id(), "cam-front");
    }

    #[tokio::test]
    async fn test_next_device_cycles() {
        let media = phone();
        media.grant_permission();
        let mut session = CameraSession::new(media.clone());

        session.acquire(FacingMode::User, None).await.unwrap();
        assert_eq!(session.next_device().await.unwrap().device_id(), "cam-back");
        assert_eq!(session.next_device().await.unwrap().device_id(), "cam-front");
        assert_eq!(media.active_tracks(), 1);
    }

    #[tokio::test]
    async fn test_next_device_without_cameras() {
        let media = SyntheticDevices::new(vec![]);
        let mut session = CameraSession::new(media);
        assert!(matches!(session.next_device().await, Err(CameraError::NoDevices)));
    }

    #[tokio::test]
    async fn test_permission_denied() {
        let media = phone();
        media.deny_permission(true);
        let mut session = CameraSession::new(media.clone());

        let err = session.acquire(FacingMode::User, None).await.err().unwrap();
        assert!(matches!(err, CameraError::PermissionDenied(_)));
        assert!(!session.is_streaming());
        assert_eq!(media.active_tracks(), 0);
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let media = phone();
        let mut session = CameraSession::new(media.clone());
        session.release();

        session.acquire(FacingMode::User, None).await.unwrap();
        session.release();
        session.release();
        assert_eq!(media.active_tracks(), 0);
        assert!(!session.is_streaming());
    }

    #[tokio::test]
    async fn test_capture_uses_native_resolution() {
        let media = phone();
        let mut session = CameraSession::new(media);
        assert!(matches!(session.capture(true), Err(CameraError::NotStreaming)));

        session.acquire(FacingMode::Environment, None).await.unwrap();
        let frame = session.capture(true).unwrap();
        assert_eq!((frame.width, frame.height), (80, 60));
    }

    #[tokio::test]
    async fn test_drop_releases() {
        let media = phone();
        {
            let mut session = CameraSession::new(media.clone());
            session.acquire(FacingMode::User, None).await.unwrap();
            assert_eq!(media.active_tracks(), 1);
        }
        assert_eq!(media.active_tracks(), 0);
    }
}
