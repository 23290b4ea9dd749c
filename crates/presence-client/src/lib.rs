//! Client for the remote verification service.
//!
//! Frames go out as multipart JPEG uploads; responses come back as typed
//! [`VerificationResult`](presence_core::VerificationResult)s. A refusal
//! with a message is a "no match" outcome, transport failures and
//! unreadable bodies are [`ClientError`]s.

pub mod client;
pub mod error;
pub mod types;

pub use client::{ClientConfig, Registrar, VerificationClient, Verifier};
pub use error::{ClientError, ClientResult};
pub use types::{Registered, UserId};
