//! V4L2 camera backend via the `v4l` crate.

use crate::device::{CameraDevice, CameraError, Constraints, MediaDevices, VideoStream};
use crate::frame::{self, Frame};
use async_trait::async_trait;
use std::path::Path;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

/// Highest `/dev/videoN` index probed during enumeration.
const MAX_VIDEO_NODES: u32 = 16;

/// Negotiated pixel format for the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed (2 bytes/pixel).
    Yuyv,
    /// Motion-JPEG, one JPEG image per buffer.
    Mjpg,
}

/// Video inputs exposed by the kernel under `/dev/video*`.
///
/// Device ids are the node paths; labels are the driver's card names.
#[derive(Debug, Clone, Default)]
pub struct V4lDevices;

impl V4lDevices {
    /// List available V4L2 video capture devices.
    pub fn list_devices() -> Vec<CameraDevice> {
        let mut devices = Vec::new();

        for i in 0..MAX_VIDEO_NODES {
            let path = format!("/dev/video{i}");
            if !Path::new(&path).exists() {
                continue;
            }
            let Ok(dev) = Device::with_path(&path) else {
                continue;
            };
            let Ok(caps) = dev.query_caps() else {
                continue;
            };
            if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
                continue;
            }
            devices.push(CameraDevice::new(path, caps.card.clone()));
        }

        devices
    }
}

#[async_trait]
impl MediaDevices for V4lDevices {
    type Stream = V4lStream;

    async fn enumerate(&self) -> Result<Vec<CameraDevice>, CameraError> {
        Ok(Self::list_devices())
    }

    async fn open(&self, constraints: &Constraints) -> Result<V4lStream, CameraError> {
        let devices = Self::list_devices();
        let target = match constraints {
            // Allow opening a node by path even if it was not enumerated.
            Constraints::Device(path) if Path::new(path).exists() => path.clone(),
            _ => constraints.select(&devices)?.id.clone(),
        };
        V4lStream::open(&target)
    }
}

/// An open V4L2 capture device.
pub struct V4lStream {
    device: Option<Device>,
    device_path: String,
    width: u32,
    height: u32,
    fourcc: FourCC,
    pixel_format: PixelFormat,
}

impl V4lStream {
    /// Open a V4L2 camera device by path (e.g., "/dev/video0").
    pub fn open(device_path: &str) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| open_error(device_path, e))?;

        let caps = device
            .query_caps()
            .map_err(|e| CameraError::CaptureFailed(format!("failed to query capabilities: {e}")))?;

        tracing::info!(
            device = device_path,
            driver = %caps.driver,
            card = %caps.card,
            "opened camera"
        );

        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::FormatNegotiationFailed(format!(
                "{device_path} is not a video capture device"
            )));
        }

        // Keep the driver's preferred resolution; only the pixel format is requested.
        let mut fmt = device.format().map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to get format: {e}"))
        })?;

        let mut negotiated = None;
        for (code, pixel_format) in [(b"YUYV", PixelFormat::Yuyv), (b"MJPG", PixelFormat::Mjpg)] {
            fmt.fourcc = FourCC::new(code);
            let got = device.set_format(&fmt).map_err(|e| {
                CameraError::FormatNegotiationFailed(format!("failed to set format: {e}"))
            })?;
            if got.fourcc == FourCC::new(code) {
                negotiated = Some((got, pixel_format));
                break;
            }
        }
        let Some((got, pixel_format)) = negotiated else {
            return Err(CameraError::FormatNegotiationFailed(format!(
                "unsupported pixel format: {:?} (need YUYV or MJPG)",
                fmt.fourcc
            )));
        };

        tracing::info!(
            width = got.width,
            height = got.height,
            fourcc = ?got.fourcc,
            "negotiated format"
        );

        Ok(Self {
            device: Some(device),
            device_path: device_path.to_string(),
            width: got.width,
            height: got.height,
            fourcc: got.fourcc,
            pixel_format,
        })
    }

    pub fn fourcc(&self) -> FourCC {
        self.fourcc
    }

    /// Convert a raw buffer to RGB based on the negotiated format.
    fn buf_to_rgb(&self, buf: &[u8]) -> Result<Vec<u8>, CameraError> {
        match self.pixel_format {
            PixelFormat::Yuyv => Ok(frame::yuyv_to_rgb(buf, self.width, self.height)?),
            PixelFormat::Mjpg => {
                let (rgb, w, h) = frame::mjpg_to_rgb(buf)?;
                if (w, h) != (self.width, self.height) {
                    return Err(CameraError::CaptureFailed(format!(
                        "MJPG frame is {w}x{h}, negotiated {}x{}",
                        self.width, self.height
                    )));
                }
                Ok(rgb)
            }
        }
    }
}

impl VideoStream for V4lStream {
    fn device_id(&self) -> &str {
        &self.device_path
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn read_frame(&mut self) -> Result<Frame, CameraError> {
        let device = self.device.as_ref().ok_or(CameraError::NotStreaming)?;
        let mut stream = MmapStream::with_buffers(device, BufType::VideoCapture, 4)
            .map_err(|e| CameraError::CaptureFailed(format!("failed to create mmap stream: {e}")))?;

        let (buf, meta) = stream
            .next()
            .map_err(|e| CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}")))?;
        let sequence = meta.sequence;

        let rgb = self.buf_to_rgb(buf)?;
        Ok(Frame::new(rgb, self.width, self.height, sequence)?)
    }

    fn stop(&mut self) {
        // Dropping the device closes the fd and releases the sensor.
        if self.device.take().is_some() {
            tracing::debug!(device = %self.device_path, "closed camera");
        }
    }

    fn is_live(&self) -> bool {
        self.device.is_some()
    }
}

fn open_error(device_path: &str, e: std::io::Error) -> CameraError {
    match e.raw_os_error() {
        Some(libc::EACCES) | Some(libc::EPERM) => {
            CameraError::PermissionDenied(format!("{device_path}: {e}"))
        }
        Some(libc::EBUSY) => CameraError::DeviceBusy(device_path.to_string()),
        _ => CameraError::DeviceNotFound(format!("{device_path}: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_error_mapping() {
        let denied = open_error("/dev/video0", std::io::Error::from_raw_os_error(libc::EACCES));
        assert!(matches!(denied, CameraError::PermissionDenied(_)));

        let busy = open_error("/dev/video0", std::io::Error::from_raw_os_error(libc::EBUSY));
        assert!(matches!(busy, CameraError::DeviceBusy(_)));

        let missing = open_error("/dev/video0", std::io::Error::from_raw_os_error(libc::ENOENT));
        assert!(matches!(missing, CameraError::DeviceNotFound(_)));
    }

    #[test]
    fn test_open_missing_node() {
        let result = V4lStream::open("/dev/video-does-not-exist");
        assert!(matches!(result, Err(CameraError::DeviceNotFound(_))));
    }
}
