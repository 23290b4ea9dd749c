//! Camera device model and the media capability seam.
//!
//! `MediaDevices` is what the platform provides (enumerate cameras, open a
//! stream under some constraint); `VideoStream` is the opened stream.
//! `CameraSession` is written against these traits only.

use crate::frame::{Frame, FrameError};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("camera permission denied: {0}")]
    PermissionDenied(String),
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("no video devices available")]
    NoDevices,
    #[error("device busy: {0}")]
    DeviceBusy(String),
    #[error("no camera satisfies constraint: {0}")]
    ConstraintUnsatisfied(String),
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("camera is not streaming")]
    NotStreaming,
    #[error("frame: {0}")]
    Frame(#[from] FrameError),
}

/// Requested camera orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FacingMode {
    /// Front camera, facing the user.
    #[default]
    User,
    /// Back camera, facing away from the user.
    Environment,
}

impl FacingMode {
    pub fn toggled(self) -> Self {
        match self {
            FacingMode::User => FacingMode::Environment,
            FacingMode::Environment => FacingMode::User,
        }
    }

    /// Label tokens that identify a camera of this orientation.
    pub fn keywords(self) -> &'static [&'static str] {
        match self {
            FacingMode::User => &["front", "user"],
            FacingMode::Environment => &["back", "rear", "environment"],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FacingMode::User => "user",
            FacingMode::Environment => "environment",
        }
    }
}

impl std::str::FromStr for FacingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" | "front" => Ok(FacingMode::User),
            "environment" | "back" | "rear" => Ok(FacingMode::Environment),
            other => Err(format!("unknown facing mode: {other}")),
        }
    }
}

impl std::fmt::Display for FacingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Facing capability inferred from a device label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Facing {
    Front,
    Back,
    Unknown,
}

impl Facing {
    pub fn from_label(label: &str) -> Self {
        if label_matches(label, FacingMode::Environment) {
            Facing::Back
        } else if label_matches(label, FacingMode::User) {
            Facing::Front
        } else {
            Facing::Unknown
        }
    }

    pub fn satisfies(self, mode: FacingMode) -> bool {
        matches!(
            (self, mode),
            (Facing::Front, FacingMode::User) | (Facing::Back, FacingMode::Environment)
        )
    }
}

/// True if any token of `label` is one of `mode`'s keywords.
///
/// Labels are split on whitespace, `-`, `_` and `/`, so "Back Camera" and
/// "camera2_rear" match while "feedback" does not.
pub fn label_matches(label: &str, mode: FacingMode) -> bool {
    let lower = label.to_lowercase();
    lower
        .split(|c: char| c.is_whitespace() || matches!(c, '-' | '_' | '/'))
        .any(|tok| mode.keywords().contains(&tok))
}

/// An enumerated video input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraDevice {
    pub id: String,
    /// Human-readable name; may be empty until camera permission is granted.
    pub label: String,
    pub facing: Facing,
}

impl CameraDevice {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        let label = label.into();
        Self {
            id: id.into(),
            facing: Facing::from_label(&label),
            label,
        }
    }
}

/// How to pick the device when opening a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraints {
    /// Exactly this device id.
    Device(String),
    /// A device of this orientation, or fail.
    FacingExact(FacingMode),
    /// A device of this orientation if there is one, otherwise any.
    FacingIdeal(FacingMode),
    /// Any video input.
    Any,
}

impl Constraints {
    /// Resolve against an enumerated device list.
    pub fn select<'a>(&self, devices: &'a [CameraDevice]) -> Result<&'a CameraDevice, CameraError> {
        match self {
            Constraints::Device(id) => devices
                .iter()
                .find(|d| &d.id == id)
                .ok_or_else(|| CameraError::DeviceNotFound(id.clone())),
            Constraints::FacingExact(mode) => devices
                .iter()
                .find(|d| d.facing.satisfies(*mode))
                .ok_or_else(|| {
                    CameraError::ConstraintUnsatisfied(format!("facingMode exact {mode}"))
                }),
            Constraints::FacingIdeal(mode) => devices
                .iter()
                .find(|d| d.facing.satisfies(*mode))
                .or_else(|| devices.first())
                .ok_or(CameraError::NoDevices),
            Constraints::Any => devices.first().ok_or(CameraError::NoDevices),
        }
    }
}

/// Platform camera capability: enumeration and stream acquisition.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    type Stream: VideoStream;

    /// List video inputs currently attached.
    async fn enumerate(&self) -> Result<Vec<CameraDevice>, CameraError>;

    /// Open a stream satisfying `constraints`.
    async fn open(&self, constraints: &Constraints) -> Result<Self::Stream, CameraError>;
}

/// An opened camera stream.
pub trait VideoStream: Send {
    /// Id of the device backing this stream.
    fn device_id(&self) -> &str;
    /// Native frame width in pixels.
    fn width(&self) -> u32;
    /// Native frame height in pixels.
    fn height(&self) -> u32;
    /// Grab the next frame as RGB8.
    fn read_frame(&mut self) -> Result<Frame, CameraError>;
    /// Stop all tracks. Idempotent.
    fn stop(&mut self);
    fn is_live(&self) -> bool;
}
