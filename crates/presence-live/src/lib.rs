//! presence-live — The live verification loop and what hangs off it.
//!
//! [`LivePoller`] owns the camera session and a [`PeriodicTask`] that sends
//! one frame per tick to a [`Verifier`](presence_client::Verifier), never
//! more than one at a time. [`FullscreenController`] switches presentation
//! without touching the loop.

pub mod fullscreen;
pub mod poller;
pub mod register;
pub mod task;

pub use fullscreen::{
    FullscreenController, HeadlessPresentation, Layout, Presentation, PresentationError,
    PresentationMode,
};
pub use poller::{LiveConfig, LiveError, LivePoller, Phase, TickOutcome};
pub use task::PeriodicTask;
