//! Verification service HTTP client.

use std::time::Duration;

use async_trait::async_trait;
use presence_core::VerificationResult;
use presence_hw::capture::ENCODED_MIME;
use presence_hw::CapturedFrame;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{ClientError, ClientResult};
use crate::types::{AnalysisBody, ErrorBody, MatchBody, ProbeBody, Registered};

const MATCH_PATH: &str = "/match/";
const MATCH_STREAM_PATH: &str = "/match/stream";
const ANALYSIS_PATH: &str = "/match/with-emotion";
const REGISTER_PATH: &str = "/admin/upload";
const HEALTH_PATH: &str = "/health";
const READY_PATH: &str = "/ready";

/// Configuration for the verification client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the verification service
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout: Duration::from_secs(15),
        }
    }
}

/// Anything that can check a captured frame against the service.
#[async_trait]
pub trait Verifier: Send + Sync {
    /// Recognition only.
    async fn verify_once(&self, frame: &CapturedFrame) -> ClientResult<VerificationResult>;

    /// Recognition plus emotion, gaze and face box.
    async fn verify_with_analysis(
        &self,
        frame: &CapturedFrame,
    ) -> ClientResult<VerificationResult>;

    /// Compact recognition for continuous frames.
    async fn verify_stream(&self, frame: &CapturedFrame) -> ClientResult<VerificationResult> {
        self.verify_once(frame).await
    }
}

/// Anything that can enroll a new identity from a captured frame.
#[async_trait]
pub trait Registrar: Send + Sync {
    async fn register(&self, name: &str, frame: &CapturedFrame) -> ClientResult<Registered>;
}

#[async_trait]
impl<T: Verifier + ?Sized> Verifier for std::sync::Arc<T> {
    async fn verify_once(&self, frame: &CapturedFrame) -> ClientResult<VerificationResult> {
        (**self).verify_once(frame).await
    }

    async fn verify_with_analysis(
        &self,
        frame: &CapturedFrame,
    ) -> ClientResult<VerificationResult> {
        (**self).verify_with_analysis(frame).await
    }

    async fn verify_stream(&self, frame: &CapturedFrame) -> ClientResult<VerificationResult> {
        (**self).verify_stream(frame).await
    }
}

#[async_trait]
impl<T: Registrar + ?Sized> Registrar for std::sync::Arc<T> {
    async fn register(&self, name: &str, frame: &CapturedFrame) -> ClientResult<Registered> {
        (**self).register(name, frame).await
    }
}

/// Client for the remote verification service.
pub struct VerificationClient {
    http: Client,
    config: ClientConfig,
}

impl VerificationClient {
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(ClientError::Network)?;

        Ok(Self { http, config })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Check whether the service answers its health probe.
    pub async fn health(&self) -> bool {
        self.probe(HEALTH_PATH, &["healthy", "ok"]).await
    }

    /// Check whether the service can take requests (database and storage up).
    pub async fn ready(&self) -> bool {
        self.probe(READY_PATH, &["ready"]).await
    }

    async fn probe(&self, path: &str, accepted: &[&str]) -> bool {
        let url = self.url(path);

        match self.http.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                match response.json::<ProbeBody>().await {
                    Ok(body) => accepted.contains(&body.status.as_str()),
                    Err(e) => {
                        warn!(%url, error = %e, "probe response unreadable");
                        false
                    }
                }
            }
            Ok(response) => {
                warn!(%url, status = %response.status(), "probe failed");
                false
            }
            Err(e) => {
                warn!(%url, error = %e, "probe error");
                false
            }
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn frame_part(frame: &CapturedFrame, filename: &str) -> ClientResult<Part> {
        Ok(Part::bytes(frame.encoded.clone())
            .file_name(filename.to_string())
            .mime_str(ENCODED_MIME)?)
    }

    async fn post(&self, path: &str, form: Form) -> ClientResult<(StatusCode, Vec<u8>)> {
        let url = self.url(path);
        debug!(%url, "posting frame");

        let response = self.http.post(&url).multipart(form).send().await?;
        let status = response.status();
        let body = response.bytes().await?.to_vec();

        if !status.is_success() {
            warn!(%url, %status, "service returned an error status");
        }
        Ok((status, body))
    }

    async fn post_frame<T>(
        &self,
        path: &str,
        frame: &CapturedFrame,
        filename: &str,
    ) -> ClientResult<VerificationResult>
    where
        T: DeserializeOwned + Into<VerificationResult>,
    {
        let form = Form::new().part("file", Self::frame_part(frame, filename)?);
        let (status, body) = self.post(path, form).await?;
        decode_verification::<T>(status, &body)
    }
}

#[async_trait]
impl Verifier for VerificationClient {
    async fn verify_once(&self, frame: &CapturedFrame) -> ClientResult<VerificationResult> {
        self.post_frame::<MatchBody>(MATCH_PATH, frame, "verify.jpg").await
    }

    async fn verify_with_analysis(
        &self,
        frame: &CapturedFrame,
    ) -> ClientResult<VerificationResult> {
        self.post_frame::<AnalysisBody>(ANALYSIS_PATH, frame, "frame.jpg").await
    }

    async fn verify_stream(&self, frame: &CapturedFrame) -> ClientResult<VerificationResult> {
        self.post_frame::<MatchBody>(MATCH_STREAM_PATH, frame, "frame.jpg").await
    }
}

#[async_trait]
impl Registrar for VerificationClient {
    async fn register(&self, name: &str, frame: &CapturedFrame) -> ClientResult<Registered> {
        let form = Form::new()
            .text("name", name.to_string())
            .part("file", Self::frame_part(frame, &format!("{name}.jpg"))?);
        let (status, body) = self.post(REGISTER_PATH, form).await?;

        if status.is_success() {
            return serde_json::from_slice(&body).map_err(|e| ClientError::Parse(e.to_string()));
        }

        let message = serde_json::from_slice::<ErrorBody>(&body)
            .ok()
            .and_then(|b| b.text())
            .or_else(|| {
                let text = String::from_utf8_lossy(&body).trim().to_string();
                (!text.is_empty()).then_some(text)
            })
            .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
        Err(ClientError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

/// Interpret a verification response.
///
/// A refusal that carries a message is a "no match" outcome, not an error.
fn decode_verification<T>(status: StatusCode, body: &[u8]) -> ClientResult<VerificationResult>
where
    T: DeserializeOwned + Into<VerificationResult>,
{
    if status.is_success() {
        let parsed: T =
            serde_json::from_slice(body).map_err(|e| ClientError::Parse(e.to_string()))?;
        return Ok(parsed.into());
    }

    let err: ErrorBody = serde_json::from_slice(body)
        .map_err(|e| ClientError::Parse(format!("HTTP {}: {e}", status.as_u16())))?;
    match err.text() {
        Some(message) => Ok(VerificationResult::no_match(Some(message), err.score)),
        None => Err(ClientError::Parse(format!("HTTP {} without detail", status.as_u16()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use presence_core::StatusKind;
    use presence_hw::{capture, Frame};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn frame() -> CapturedFrame {
        capture::encode(Frame::new(vec![90; 4 * 4 * 3], 4, 4, 0).unwrap(), true).unwrap()
    }

    async fn client_for(server: &MockServer) -> VerificationClient {
        VerificationClient::new(ClientConfig {
            base_url: server.uri(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    /// Raw multipart body of the last request the server saw.
    async fn last_upload(server: &MockServer) -> String {
        let requests = server.received_requests().await.unwrap();
        let request = requests.last().unwrap();
        let content_type = request.headers.get("content-type").unwrap().to_str().unwrap();
        assert!(content_type.starts_with("multipart/form-data; boundary="));
        String::from_utf8_lossy(&request.body).into_owned()
    }

    #[test]
    fn test_config_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url, "http://localhost:8000");
        assert_eq!(config.timeout, Duration::from_secs(15));
    }

    #[tokio::test]
    async fn test_verify_with_analysis_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/match/with-emotion"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "face_recognition": {
                    "threshold_met": true, "user_id": 12, "user_name": "Grace",
                    "score": 0.83, "attendance_created": true
                },
                "emotion_detection": {
                    "success": true, "dominant_emotion": "neutral", "confidence": 0.64,
                    "gaze": { "is_looking_at_camera": true },
                    "face_bbox": { "x": 120, "y": 60, "width": 200, "height": 220 }
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = client_for(&server)
            .await
            .verify_with_analysis(&frame())
            .await
            .unwrap();
        assert!(result.matched);
        assert_eq!(result.user_id.as_deref(), Some("12"));
        assert_eq!(result.user_name.as_deref(), Some("Grace"));
        assert!(result.attendance_created);
        assert_eq!(result.emotion.as_ref().map(|e| e.label.as_str()), Some("neutral"));
        assert_eq!(result.gaze.map(|g| g.is_looking_at_camera), Some(true));
        let bbox = result.face_bbox.unwrap();
        assert_eq!((bbox.x, bbox.width), (120.0, 200.0));

        let upload = last_upload(&server).await;
        assert!(upload.contains(
            "Content-Disposition: form-data; name=\"file\"; filename=\"frame.jpg\"\r\n\
             Content-Type: image/jpeg\r\n"
        ));
    }

    #[tokio::test]
    async fn test_unrelated_success_body_is_parse_error() {
        let server = MockServer::start().await;
        for endpoint in ["/match/", "/match/with-emotion", "/match/stream"] {
            Mock::given(method("POST"))
                .and(path(endpoint))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "unexpected": 1 })))
                .expect(1)
                .mount(&server)
                .await;
        }
        let client = client_for(&server).await;

        let err = client.verify_once(&frame()).await.unwrap_err();
        assert!(matches!(err, ClientError::Parse(_)));
        assert_eq!(err.user_message(), "Verification failed");

        let err = client.verify_with_analysis(&frame()).await.unwrap_err();
        assert!(matches!(err, ClientError::Parse(_)));
        assert_eq!(err.kind(), StatusKind::Parse);

        let err = client.verify_stream(&frame()).await.unwrap_err();
        assert!(matches!(err, ClientError::Parse(_)));
    }

    #[tokio::test]
    async fn test_verify_stream_compact_shapes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/match/stream"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "user_id": 7, "score": 0.88, "created": false
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/match/stream"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "user_id": null, "score": 0.27 })),
            )
            .mount(&server)
            .await;
        let client = client_for(&server).await;

        let seen = client.verify_stream(&frame()).await.unwrap();
        assert!(seen.matched);
        assert_eq!(seen.summary(), "Welcome, 7! (Already present)");
        assert!(last_upload(&server).await.contains("name=\"file\"; filename=\"frame.jpg\""));

        let unknown = client.verify_stream(&frame()).await.unwrap();
        assert!(!unknown.matched);
        assert_eq!(unknown.score, Some(0.27));
    }

    #[tokio::test]
    async fn test_verify_once_detail_is_verbatim_no_match() {
        let server = MockServer::start().await;
        let detail = "No match found (best score=0.412, threshold=0.6)";
        Mock::given(method("POST"))
            .and(path("/match/"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "detail": detail, "score": 0.412
            })))
            .mount(&server)
            .await;

        let result = client_for(&server).await.verify_once(&frame()).await.unwrap();
        assert!(!result.matched);
        assert_eq!(result.message.as_deref(), Some(detail));
        assert_eq!(result.score, Some(0.412));
    }

    #[tokio::test]
    async fn test_verify_once_matched() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/match/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": "Face matched", "user_id": 4, "score": 0.9, "dedup": false
            })))
            .mount(&server)
            .await;

        let result = client_for(&server).await.verify_once(&frame()).await.unwrap();
        assert!(result.matched);
        assert!(result.attendance_created);
        assert_eq!(result.summary(), "Welcome, 4! (New attendance)");
    }

    #[tokio::test]
    async fn test_unparsable_error_body_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("<html>Bad Gateway</html>"))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.verify_with_analysis(&frame()).await.unwrap_err();
        assert!(matches!(err, ClientError::Parse(_)));
        assert_eq!(err.kind(), StatusKind::Parse);
        assert_eq!(err.user_message(), "Verification failed");
    }

    #[tokio::test]
    async fn test_unparsable_success_body_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = client_for(&server).await.verify_once(&frame()).await.unwrap_err();
        assert!(matches!(err, ClientError::Parse(_)));
    }

    #[tokio::test]
    async fn test_register_success_and_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/admin/upload"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "user_id": 21, "name": "Lin" })),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/admin/upload"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({ "detail": "No face detected" })),
            )
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let created = client.register("Lin", &frame()).await.unwrap();
        assert_eq!(created.user_id.to_string(), "21");

        let upload = last_upload(&server).await;
        assert!(upload.contains("form-data; name=\"name\"\r\n\r\nLin\r\n"));
        assert!(upload.contains(
            "Content-Disposition: form-data; name=\"file\"; filename=\"Lin.jpg\"\r\n\
             Content-Type: image/jpeg\r\n"
        ));

        let err = client.register("Lin", &frame()).await.unwrap_err();
        assert!(matches!(err, ClientError::Rejected { status: 400, .. }));
        assert_eq!(err.to_string(), "No face detected");
        assert_eq!(err.kind(), StatusKind::Service);
    }

    #[tokio::test]
    async fn test_health() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "ok" })))
            .mount(&server)
            .await;

        assert!(client_for(&server).await.health().await);
    }

    #[tokio::test]
    async fn test_ready() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ready"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "ready", "message": "Service is ready to handle requests"
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/ready"))
            .respond_with(
                ResponseTemplate::new(503).set_body_json(json!({ "detail": "Service not ready" })),
            )
            .mount(&server)
            .await;
        let client = client_for(&server).await;

        assert!(client.ready().await);
        assert!(!client.ready().await);
    }

    #[tokio::test]
    async fn test_unreachable_service_is_network_error() {
        let client = VerificationClient::new(ClientConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            timeout: Duration::from_secs(2),
        })
        .unwrap();

        let err = client.verify_with_analysis(&frame()).await.unwrap_err();
        assert_eq!(err.kind(), StatusKind::Network);
        assert!(!client.health().await);
        assert!(!client.ready().await);
    }
}
