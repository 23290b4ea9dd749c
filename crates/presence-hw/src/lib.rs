//! presence-hw — Camera ownership and frame capture.
//!
//! `MediaDevices` abstracts the platform camera stack (V4L2 or the
//! synthetic test pattern); `CameraSession` owns the one active stream and
//! `capture` turns its frames into mirrored JPEGs ready for upload.

pub mod camera;
pub mod capture;
pub mod device;
pub mod frame;
pub mod session;
pub mod synthetic;

pub use camera::{PixelFormat, V4lDevices, V4lStream};
pub use capture::{CapturedFrame, JPEG_QUALITY};
pub use device::{
    CameraDevice, CameraError, Constraints, Facing, FacingMode, MediaDevices, VideoStream,
};
pub use frame::Frame;
pub use session::{CameraSession, StreamSession, StreamState};
pub use synthetic::{SyntheticCamera, SyntheticDevices};
