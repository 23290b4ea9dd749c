//! presence-core — Data model, attention tally and overlay rendering.
//!
//! Nothing here touches hardware or the network; the live loop feeds
//! verification results in and reads stats and drawing commands out.

pub mod attention;
pub mod overlay;
pub mod status;
pub mod types;

pub use attention::{AttentionPolicy, AttentionStats};
pub use overlay::{Canvas, Color, DrawList, DrawOp, OverlayRenderer, Rect};
pub use status::{Status, StatusKind};
pub use types::{Emotion, FaceBox, Gaze, VerificationResult};
