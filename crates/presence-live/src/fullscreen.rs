//! Presentation mode, kept in step with the native fullscreen state.
//!
//! Nothing here touches the camera or the live loop: switching modes only
//! changes which panels are laid out.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum PresentationError {
    #[error("fullscreen is not supported here")]
    Unsupported,
    #[error("fullscreen request rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PresentationMode {
    #[default]
    Windowed,
    Fullscreen,
}

/// Native fullscreen capability of the host surface.
#[async_trait]
pub trait Presentation: Send + Sync {
    async fn request_fullscreen(&self) -> Result<(), PresentationError>;
    async fn exit_fullscreen(&self) -> Result<(), PresentationError>;
    fn is_fullscreen(&self) -> bool;
}

/// Which parts of the UI are shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    /// Registration form, result history and other side panels.
    pub secondary_panels: bool,
    /// Persistent start/stop/switch bar.
    pub control_bar: bool,
    /// Button to go back to fullscreen after leaving it mid-session.
    pub reopen_fullscreen: bool,
}

impl Layout {
    pub fn for_mode(mode: PresentationMode, live: bool) -> Self {
        match mode {
            PresentationMode::Fullscreen => Self {
                secondary_panels: false,
                control_bar: true,
                reopen_fullscreen: false,
            },
            PresentationMode::Windowed => Self {
                secondary_panels: true,
                control_bar: true,
                reopen_fullscreen: live,
            },
        }
    }
}

/// Tracks the presentation mode and drives the native capability.
pub struct FullscreenController<P: Presentation> {
    presentation: P,
    mode: watch::Sender<PresentationMode>,
}

impl<P: Presentation> FullscreenController<P> {
    pub fn new(presentation: P) -> Self {
        let initial = if presentation.is_fullscreen() {
            PresentationMode::Fullscreen
        } else {
            PresentationMode::Windowed
        };
        let (mode, _) = watch::channel(initial);
        Self { presentation, mode }
    }

    pub fn mode(&self) -> PresentationMode {
        *self.mode.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<PresentationMode> {
        self.mode.subscribe()
    }

    pub fn layout(&self, live: bool) -> Layout {
        Layout::for_mode(self.mode(), live)
    }

    /// Ask for fullscreen. A rejected request leaves the mode unchanged.
    pub async fn enter(&self) -> Result<(), PresentationError> {
        if self.mode() == PresentationMode::Fullscreen {
            return Ok(());
        }
        if let Err(e) = self.presentation.request_fullscreen().await {
            warn!(error = %e, "fullscreen request failed");
            return Err(e);
        }
        self.sync(self.presentation.is_fullscreen());
        Ok(())
    }

    pub async fn exit(&self) -> Result<(), PresentationError> {
        if self.mode() == PresentationMode::Windowed {
            return Ok(());
        }
        if let Err(e) = self.presentation.exit_fullscreen().await {
            warn!(error = %e, "leaving fullscreen failed");
            return Err(e);
        }
        self.sync(self.presentation.is_fullscreen());
        Ok(())
    }

    pub async fn toggle(&self) -> Result<PresentationMode, PresentationError> {
        match self.mode() {
            PresentationMode::Windowed => self.enter().await?,
            PresentationMode::Fullscreen => self.exit().await?,
        }
        Ok(self.mode())
    }

    /// Fullscreen-change handler: adopt whatever the host reports.
    ///
    /// Covers the user leaving fullscreen with Escape, which never goes
    /// through [`exit`](Self::exit).
    pub fn sync(&self, native: bool) -> PresentationMode {
        let mode = if native {
            PresentationMode::Fullscreen
        } else {
            PresentationMode::Windowed
        };
        let changed = self.mode.send_if_modified(|current| {
            let changed = *current != mode;
            *current = mode;
            changed
        });
        if changed {
            info!(?mode, "presentation mode changed");
        }
        mode
    }
}

/// Presentation for surfaces without a window manager; fullscreen is a flag.
#[derive(Debug, Default)]
pub struct HeadlessPresentation {
    fullscreen: AtomicBool,
    reject: AtomicBool,
}

impl HeadlessPresentation {
    /// Make subsequent requests fail, as a host denying fullscreen would.
    pub fn reject_requests(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    /// Simulate the host leaving fullscreen on its own.
    pub fn force_exit(&self) {
        self.fullscreen.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl Presentation for HeadlessPresentation {
    async fn request_fullscreen(&self) -> Result<(), PresentationError> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(PresentationError::Rejected("not allowed".into()));
        }
        self.fullscreen.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn exit_fullscreen(&self) -> Result<(), PresentationError> {
        self.fullscreen.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_fullscreen(&self) -> bool {
        self.fullscreen.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<T: Presentation + ?Sized> Presentation for std::sync::Arc<T> {
    async fn request_fullscreen(&self) -> Result<(), PresentationError> {
        (**self).request_fullscreen().await
    }

    async fn exit_fullscreen(&self) -> Result<(), PresentationError> {
        (**self).exit_fullscreen().await
    }

    fn is_fullscreen(&self) -> bool {
        (**self).is_fullscreen()
    }
}
