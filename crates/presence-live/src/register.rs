//! Enrolling a new identity from the live camera.

use presence_client::{Registered, Registrar};
use presence_core::Status;
use presence_hw::{CameraSession, CapturedFrame, MediaDevices};

use crate::poller::LiveError;

/// Trimmed, non-empty registration name.
pub fn registration_name(name: &str) -> Result<&str, LiveError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(LiveError::Invalid("Enter name first"));
    }
    Ok(name)
}

/// Grab the frame to enroll. The camera must already be streaming.
pub fn capture_for_registration<D: MediaDevices>(
    camera: &mut CameraSession<D>,
    mirror: bool,
) -> Result<CapturedFrame, LiveError> {
    if !camera.is_streaming() {
        return Err(LiveError::Invalid("Start camera first"));
    }
    Ok(camera.capture(mirror)?)
}

pub async fn submit<R: Registrar + ?Sized>(
    registrar: &R,
    name: &str,
    frame: &CapturedFrame,
) -> Result<Registered, LiveError> {
    let registered = registrar.register(name, frame).await?;
    tracing::info!(user_id = %registered.user_id, name, "registered new identity");
    Ok(registered)
}

pub fn registered_status(registered: &Registered) -> Status {
    Status::success(format!("Successfully registered! User ID: {}", registered.user_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use presence_client::{ClientError, ClientResult, UserId};
    use presence_core::StatusKind;
    use presence_hw::{FacingMode, SyntheticDevices};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingRegistrar {
        names: Mutex<Vec<String>>,
        reject: bool,
    }

    #[async_trait]
    impl Registrar for RecordingRegistrar {
        async fn register(&self, name: &str, frame: &CapturedFrame) -> ClientResult<Registered> {
            assert!(!frame.encoded.is_empty());
            self.names.lock().unwrap().push(name.to_string());
            if self.reject {
                return Err(ClientError::Rejected {
                    status: 400,
                    message: "No face detected".into(),
                });
            }
            Ok(Registered {
                user_id: UserId::Int(5),
                name: Some(name.to_string()),
            })
        }
    }

    #[test]
    fn test_registration_name() {
        assert_eq!(registration_name("  Ada ").unwrap(), "Ada");
        let err = registration_name("   ").unwrap_err();
        assert_eq!(err.to_string(), "Enter name first");
    }

    #[test]
    fn test_capture_requires_streaming_camera() {
        let mut camera = CameraSession::new(SyntheticDevices::webcam());
        let err = capture_for_registration(&mut camera, true).unwrap_err();
        assert_eq!(err.to_string(), "Start camera first");
    }

    #[tokio::test]
    async fn test_submit_success() {
        let mut camera = CameraSession::new(SyntheticDevices::webcam());
        camera.acquire(FacingMode::User, None).await.unwrap();
        let frame = capture_for_registration(&mut camera, true).unwrap();
        assert!(frame.mirrored);

        let registrar = RecordingRegistrar::default();
        let registered = submit(&registrar, "Ada", &frame).await.unwrap();
        assert_eq!(registered.user_id.to_string(), "5");
        assert_eq!(*registrar.names.lock().unwrap(), vec!["Ada".to_string()]);

        let status = registered_status(&registered);
        assert_eq!(status.message, "Successfully registered! User ID: 5");
        assert!(status.is_ok());
    }

    #[tokio::test]
    async fn test_submit_rejection_keeps_message() {
        let mut camera = CameraSession::new(SyntheticDevices::webcam());
        camera.acquire(FacingMode::User, None).await.unwrap();
        let frame = capture_for_registration(&mut camera, false).unwrap();

        let registrar = RecordingRegistrar {
            reject: true,
            ..RecordingRegistrar::default()
        };
        let err = submit(&registrar, "Ada", &frame).await.unwrap_err();
        assert_eq!(err.status().kind, StatusKind::Service);
        assert_eq!(err.status().message, "No face detected");
    }
}
