//! Wire types of the verification service.

use presence_core::{Emotion, FaceBox, Gaze, VerificationResult};
use serde::{Deserialize, Deserializer};

/// User ids come back as integers from some endpoints and strings from others.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum UserId {
    Int(i64),
    Str(String),
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserId::Int(id) => write!(f, "{id}"),
            UserId::Str(id) => f.write_str(id),
        }
    }
}

/// Body of a non-2xx response.
#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    /// Usually a string; validation failures send a structured value.
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub score: Option<f32>,
}

impl ErrorBody {
    /// The machine-readable message, verbatim when it is a string.
    pub fn text(&self) -> Option<String> {
        match &self.detail {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(serde_json::Value::Null) | None => self.message.clone(),
            Some(other) => Some(other.to_string()),
        }
    }
}

/// A key that must be present but may be `null`.
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer)
}

/// Match-only response.
///
/// Covers `{matched, user_id, score}`, `{message, user_id, score, dedup}` and
/// the `/match/stream` shape `{user_id | null, score, created}`. Every shape
/// carries `user_id`, so a body without it is malformed.
#[derive(Debug, Deserialize)]
pub struct MatchBody {
    #[serde(default)]
    pub matched: Option<bool>,
    #[serde(deserialize_with = "nullable")]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub score: Option<f32>,
    #[serde(default)]
    pub created: Option<bool>,
    #[serde(default)]
    pub attendance_created: Option<bool>,
    #[serde(default)]
    pub dedup: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
}

impl From<MatchBody> for VerificationResult {
    fn from(body: MatchBody) -> Self {
        let matched = body.matched.unwrap_or(body.user_id.is_some());
        if !matched {
            return VerificationResult::no_match(None, body.score);
        }
        let attendance_created = body
            .attendance_created
            .or(body.created)
            .or(body.dedup.map(|d| !d))
            .unwrap_or(false);
        VerificationResult {
            matched,
            user_id: body.user_id.map(|id| id.to_string()),
            user_name: body.user_name,
            score: body.score,
            attendance_created,
            ..VerificationResult::default()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct FaceRecognitionBody {
    pub threshold_met: bool,
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub score: Option<f32>,
    #[serde(default)]
    pub attendance_created: bool,
}

#[derive(Debug, Deserialize)]
pub struct GazeBody {
    pub is_looking_at_camera: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct EmotionDetectionBody {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub dominant_emotion: Option<String>,
    #[serde(default)]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub gaze: Option<GazeBody>,
    #[serde(default)]
    pub face_bbox: Option<FaceBox>,
}

/// Combined recognition + emotion/gaze response.
#[derive(Debug, Deserialize)]
pub struct AnalysisBody {
    pub face_recognition: FaceRecognitionBody,
    #[serde(default)]
    pub emotion_detection: Option<EmotionDetectionBody>,
}

impl From<AnalysisBody> for VerificationResult {
    fn from(body: AnalysisBody) -> Self {
        let fr = body.face_recognition;
        let mut result = if fr.threshold_met {
            VerificationResult {
                matched: true,
                user_id: fr.user_id.map(|id| id.to_string()),
                user_name: fr.user_name,
                score: fr.score,
                attendance_created: fr.attendance_created,
                ..VerificationResult::default()
            }
        } else {
            VerificationResult::no_match(None, fr.score)
        };

        // Analysis fields only count when the classifier reports success.
        if let Some(ed) = body.emotion_detection.filter(|ed| ed.success) {
            result.emotion = ed.dominant_emotion.map(|label| Emotion {
                label,
                confidence: ed.confidence.unwrap_or(0.0),
            });
            result.gaze = ed.gaze.map(|g| Gaze {
                is_looking_at_camera: g.is_looking_at_camera,
            });
            result.face_bbox = ed.face_bbox;
        }
        result
    }
}

/// Identity created by the registration endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Registered {
    pub user_id: UserId,
    #[serde(default)]
    pub name: Option<String>,
}

/// Body of `/health` and `/ready`.
#[derive(Debug, Deserialize)]
pub struct ProbeBody {
    pub status: String,
}
