use serde::{Deserialize, Serialize};

/// Face bounding box in the capture buffer's pixel space (un-mirrored).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl FaceBox {
    /// Horizontal position of the box once the frame is shown mirrored
    /// on a surface `canvas_width` pixels wide.
    pub fn mirrored_x(&self, canvas_width: f32) -> f32 {
        canvas_width - (self.x + self.width)
    }
}

/// Dominant emotion reported by the remote classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Emotion {
    pub label: String,
    /// Classifier confidence in [0, 1].
    pub confidence: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gaze {
    pub is_looking_at_camera: bool,
}

/// Typed outcome of one verification call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub matched: bool,
    pub user_id: Option<String>,
    pub user_name: Option<String>,
    /// Best similarity score reported by the service, if any.
    pub score: Option<f32>,
    pub attendance_created: bool,
    /// Service-provided explanation for a refused match, kept verbatim.
    pub message: Option<String>,
    pub emotion: Option<Emotion>,
    pub gaze: Option<Gaze>,
    pub face_bbox: Option<FaceBox>,
}

impl VerificationResult {
    /// A "no match" outcome carrying the service's message and score.
    pub fn no_match(message: Option<String>, score: Option<f32>) -> Self {
        Self {
            matched: false,
            score,
            message,
            ..Self::default()
        }
    }

    /// Name to greet a matched user with: display name, falling back to the id.
    pub fn display_name(&self) -> Option<&str> {
        self.user_name.as_deref().or(self.user_id.as_deref())
    }

    /// Human-readable status line for this outcome.
    pub fn summary(&self) -> String {
        if self.matched {
            let who = self.display_name().unwrap_or("unknown");
            let suffix = if self.attendance_created {
                "(New attendance)"
            } else {
                "(Already present)"
            };
            return format!("Welcome, {who}! {suffix}");
        }

        let base = self
            .message
            .clone()
            .unwrap_or_else(|| "No face match found".to_string());
        match self.score {
            Some(score) => format!("{base} (Confidence: {:.1}%)", score * 100.0),
            None => base,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mirrored_x() {
        let b = FaceBox {
            x: 100.0,
            y: 20.0,
            width: 50.0,
            height: 60.0,
        };
        assert_eq!(b.mirrored_x(640.0), 490.0);
    }

    #[test]
    fn test_mirrored_x_box_at_left_edge_lands_on_right_edge() {
        let b = FaceBox {
            x: 0.0,
            y: 0.0,
            width: 40.0,
            height: 40.0,
        };
        assert_eq!(b.mirrored_x(320.0), 280.0);
    }

    #[test]
    fn test_summary_matched_new_attendance() {
        let r = VerificationResult {
            matched: true,
            user_id: Some("7".into()),
            user_name: Some("Ada".into()),
            attendance_created: true,
            ..Default::default()
        };
        assert_eq!(r.summary(), "Welcome, Ada! (New attendance)");
    }

    #[test]
    fn test_summary_matched_falls_back_to_id() {
        let r = VerificationResult {
            matched: true,
            user_id: Some("7".into()),
            ..Default::default()
        };
        assert_eq!(r.summary(), "Welcome, 7! (Already present)");
    }

    #[test]
    fn test_summary_no_match_with_score() {
        let r = VerificationResult::no_match(None, Some(0.4213));
        assert_eq!(r.summary(), "No face match found (Confidence: 42.1%)");
    }

    #[test]
    fn test_summary_service_message_is_verbatim() {
        let msg = "No match found (best score=0.312, threshold=0.6)";
        let r = VerificationResult::no_match(Some(msg.into()), None);
        assert_eq!(r.summary(), msg);
    }
}
