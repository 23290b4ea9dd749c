//! Frame capture: snapshot a stream frame, mirror it, encode it for upload.

use crate::device::{CameraError, VideoStream};
use crate::frame::{Frame, FrameError};
use chrono::{DateTime, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;

/// JPEG quality used for every uploaded frame.
pub const JPEG_QUALITY: u8 = 92;

/// MIME type of [`CapturedFrame::encoded`].
pub const ENCODED_MIME: &str = "image/jpeg";

/// A frame ready for transmission.
///
/// `pixels` is exactly what the user saw in the preview: when mirrored, the
/// buffer is flipped before encoding, so server-side coordinates refer to
/// the flipped image.
#[derive(Clone)]
pub struct CapturedFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: RgbImage,
    pub encoded: Vec<u8>,
    pub captured_at: DateTime<Utc>,
    pub mirrored: bool,
}

impl std::fmt::Debug for CapturedFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapturedFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("encoded_bytes", &self.encoded.len())
            .field("captured_at", &self.captured_at)
            .field("mirrored", &self.mirrored)
            .finish()
    }
}

/// Grab one frame from `stream` and turn it into a [`CapturedFrame`].
pub fn capture<S: VideoStream + ?Sized>(
    stream: &mut S,
    mirror: bool,
) -> Result<CapturedFrame, CameraError> {
    if !stream.is_live() {
        return Err(CameraError::NotStreaming);
    }
    let frame = stream.read_frame()?;
    tracing::debug!(
        device = stream.device_id(),
        width = frame.width,
        height = frame.height,
        seq = frame.sequence,
        mirror,
        "captured frame"
    );
    Ok(encode(frame, mirror)?)
}

/// Mirror (optionally) and JPEG-encode a raw frame.
///
/// The output keeps the frame's native resolution.
pub fn encode(frame: Frame, mirror: bool) -> Result<CapturedFrame, FrameError> {
    let (width, height) = (frame.width, frame.height);
    let actual = frame.data.len();
    let mut pixels = RgbImage::from_raw(width, height, frame.data).ok_or(FrameError::InvalidLength {
        expected: (width * height * 3) as usize,
        actual,
    })?;

    if mirror {
        image::imageops::flip_horizontal_in_place(&mut pixels);
    }

    let mut encoded = Vec::new();
    JpegEncoder::new_with_quality(&mut encoded, JPEG_QUALITY)
        .encode_image(&pixels)
        .map_err(FrameError::Encode)?;

    Ok(CapturedFrame {
        width,
        height,
        pixels,
        encoded,
        captured_at: Utc::now(),
        mirrored: mirror,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 4x2 frame whose left half is black and right half white.
    fn split_frame() -> Frame {
        let mut data = Vec::new();
        for _y in 0..2 {
            for x in 0..4 {
                let v = if x < 2 { 0 } else { 255 };
                data.extend_from_slice(&[v, v, v]);
            }
        }
        Frame::new(data, 4, 2, 1).unwrap()
    }

    #[test]
    fn test_encode_keeps_native_resolution() {
        let captured = encode(split_frame(), true).unwrap();
        assert_eq!((captured.width, captured.height), (4, 2));
        assert_eq!(captured.pixels.dimensions(), (4, 2));
    }

    #[test]
    fn test_encode_mirrors_horizontally() {
        let captured = encode(split_frame(), true).unwrap();
        assert_eq!(captured.pixels.get_pixel(0, 0).0, [255, 255, 255]);
        assert_eq!(captured.pixels.get_pixel(3, 1).0, [0, 0, 0]);
        assert!(captured.mirrored);
    }

    #[test]
    fn test_encode_without_mirror_preserves_layout() {
        let captured = encode(split_frame(), false).unwrap();
        assert_eq!(captured.pixels.get_pixel(0, 0).0, [0, 0, 0]);
        assert_eq!(captured.pixels.get_pixel(3, 0).0, [255, 255, 255]);
    }

    #[test]
    fn test_encoded_is_jpeg() {
        let captured = encode(split_frame(), true).unwrap();
        // SOI marker
        assert_eq!(&captured.encoded[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&captured.encoded).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (4, 2));
    }
}
