//! Synthetic cameras producing a test pattern.
//!
//! Behaves like a browser media stack: labels stay blank until the first
//! stream has been granted, permission can be denied, and every open
//! stream counts as one active track until it is stopped.

use crate::device::{CameraDevice, CameraError, Constraints, MediaDevices, VideoStream};
use crate::frame::Frame;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// One fake camera.
#[derive(Debug, Clone)]
pub struct SyntheticCamera {
    pub device: CameraDevice,
    pub width: u32,
    pub height: u32,
}

impl SyntheticCamera {
    pub fn new(id: &str, label: &str, width: u32, height: u32) -> Self {
        Self {
            device: CameraDevice::new(id, label),
            width,
            height,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    cameras: Vec<SyntheticCamera>,
    granted: AtomicBool,
    denied: AtomicBool,
    active_tracks: AtomicUsize,
    opened: AtomicUsize,
}

/// Cloneable handle; clones share state so tests can observe track counts.
#[derive(Debug, Clone, Default)]
pub struct SyntheticDevices {
    inner: Arc<Inner>,
}

impl SyntheticDevices {
    pub fn new(cameras: Vec<SyntheticCamera>) -> Self {
        Self {
            inner: Arc::new(Inner {
                cameras,
                ..Inner::default()
            }),
        }
    }

    /// A single built-in webcam.
    pub fn webcam() -> Self {
        Self::new(vec![SyntheticCamera::new("synthetic0", "Integrated Webcam", 640, 480)])
    }

    /// Behave as if the user already allowed camera access.
    pub fn grant_permission(&self) {
        self.inner.granted.store(true, Ordering::SeqCst);
    }

    pub fn deny_permission(&self, deny: bool) {
        self.inner.denied.store(deny, Ordering::SeqCst);
    }

    /// Number of streams opened and not yet stopped.
    pub fn active_tracks(&self) -> usize {
        self.inner.active_tracks.load(Ordering::SeqCst)
    }

    /// Total successful opens.
    pub fn open_count(&self) -> usize {
        self.inner.opened.load(Ordering::SeqCst)
    }

    fn devices(&self) -> Vec<CameraDevice> {
        self.inner.cameras.iter().map(|c| c.device.clone()).collect()
    }
}

#[async_trait]
impl MediaDevices for SyntheticDevices {
    type Stream = SyntheticStream;

    async fn enumerate(&self) -> Result<Vec<CameraDevice>, CameraError> {
        let granted = self.inner.granted.load(Ordering::SeqCst);
        Ok(self
            .devices()
            .into_iter()
            .map(|d| if granted { d } else { CameraDevice::new(d.id, "") })
            .collect())
    }

    async fn open(&self, constraints: &Constraints) -> Result<SyntheticStream, CameraError> {
        if self.inner.denied.load(Ordering::SeqCst) {
            return Err(CameraError::PermissionDenied("NotAllowedError".into()));
        }
        let devices = self.devices();
        let device = constraints.select(&devices)?;
        let camera = self
            .inner
            .cameras
            .iter()
            .find(|c| c.device.id == device.id)
            .ok_or_else(|| CameraError::DeviceNotFound(device.id.clone()))?;

        self.inner.granted.store(true, Ordering::SeqCst);
        self.inner.opened.fetch_add(1, Ordering::SeqCst);
        self.inner.active_tracks.fetch_add(1, Ordering::SeqCst);

        Ok(SyntheticStream {
            owner: self.inner.clone(),
            device_id: camera.device.id.clone(),
            width: camera.width,
            height: camera.height,
            sequence: 0,
            live: true,
        })
    }
}

pub struct SyntheticStream {
    owner: Arc<Inner>,
    device_id: String,
    width: u32,
    height: u32,
    sequence: u32,
    live: bool,
}

impl VideoStream for SyntheticStream {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn read_frame(&mut self) -> Result<Frame, CameraError> {
        if !self.live {
            return Err(CameraError::NotStreaming);
        }
        let seq = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);
        let (w, h) = (self.width, self.height);
        // Horizontal gradient that drifts with the sequence number.
        let mut data = Vec::with_capacity((w * h * 3) as usize);
        for y in 0..h {
            for x in 0..w {
                let r = ((x * 255) / w.max(1)) as u8;
                let g = ((y * 255) / h.max(1)) as u8;
                let b = (seq % 256) as u8;
                data.extend_from_slice(&[r, g, b]);
            }
        }
        Ok(Frame::new(data, w, h, seq)?)
    }

    fn stop(&mut self) {
        if self.live {
            self.live = false;
            self.owner.active_tracks.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn is_live(&self) -> bool {
        self.live
    }
}

impl Drop for SyntheticStream {
    fn drop(&mut self) {
        self.stop();
    }
}
