//! Detection overlay drawn over the mirrored preview.
//!
//! Boxes arrive in the capture buffer's coordinate space, which is the
//! un-mirrored camera image. The preview is shown mirrored, so every box is
//! flipped horizontally before drawing.

use crate::types::VerificationResult;

/// Line width of the face rectangle, in canvas pixels.
const BOX_LINE_WIDTH: f32 = 3.0;
/// Vertical space reserved for one text label.
const LABEL_HEIGHT: f32 = 18.0;
/// Gap between a label baseline and the box edge.
const LABEL_GAP: f32 = 6.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const AFFIRMATIVE: Color = Color {
        r: 0x22,
        g: 0xc5,
        b: 0x5e,
    };
    pub const WARNING: Color = Color {
        r: 0xf5,
        g: 0x9e,
        b: 0x0b,
    };
}

/// Axis-aligned rectangle in canvas pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Minimal 2D drawing surface the overlay needs.
pub trait Canvas {
    /// Canvas size in pixels (width, height).
    fn size(&self) -> (u32, u32);
    /// Erase everything previously drawn.
    fn clear(&mut self);
    fn stroke_rect(&mut self, rect: Rect, color: Color, line_width: f32);
    /// Draw `text` with its baseline starting at (x, y).
    fn fill_text(&mut self, text: &str, x: f32, y: f32, color: Color);
}

/// One recorded drawing command.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    Clear,
    StrokeRect {
        rect: Rect,
        color: Color,
        line_width: f32,
    },
    FillText {
        text: String,
        x: f32,
        y: f32,
        color: Color,
    },
}

/// Canvas that records drawing commands instead of rasterizing them.
///
/// `clear` drops everything recorded so far, so `ops()` always describes
/// what is currently visible (starting with the `Clear` itself).
#[derive(Debug, Clone, Default)]
pub struct DrawList {
    width: u32,
    height: u32,
    ops: Vec<DrawOp>,
}

impl DrawList {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ops: Vec::new(),
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    pub fn ops(&self) -> &[DrawOp] {
        &self.ops
    }

    /// Rectangles currently on the canvas.
    pub fn rects(&self) -> impl Iterator<Item = &Rect> {
        self.ops.iter().filter_map(|op| match op {
            DrawOp::StrokeRect { rect, .. } => Some(rect),
            _ => None,
        })
    }

    /// Text labels currently on the canvas.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.ops.iter().filter_map(|op| match op {
            DrawOp::FillText { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }
}

impl Canvas for DrawList {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn clear(&mut self) {
        self.ops.clear();
        self.ops.push(DrawOp::Clear);
    }

    fn stroke_rect(&mut self, rect: Rect, color: Color, line_width: f32) {
        self.ops.push(DrawOp::StrokeRect {
            rect,
            color,
            line_width,
        });
    }

    fn fill_text(&mut self, text: &str, x: f32, y: f32, color: Color) {
        self.ops.push(DrawOp::FillText {
            text: text.to_string(),
            x,
            y,
            color,
        });
    }
}

/// Draws the latest detection as a mirrored box with emotion and attention labels.
#[derive(Debug, Clone, Copy, Default)]
pub struct OverlayRenderer;

impl OverlayRenderer {
    /// Clear `ctx` and draw `result`'s face box, if it has one.
    ///
    /// The canvas is cleared even when there is nothing to draw so that a
    /// frame without a face never leaves the previous box behind.
    pub fn render<C: Canvas + ?Sized>(
        &self,
        ctx: &mut C,
        result: &VerificationResult,
        canvas_width: u32,
    ) {
        ctx.clear();

        let Some(bbox) = result.face_bbox else {
            return;
        };

        let looking = result.gaze.map(|g| g.is_looking_at_camera);
        let color = if looking == Some(true) {
            Color::AFFIRMATIVE
        } else {
            Color::WARNING
        };

        let rect = Rect {
            x: bbox.mirrored_x(canvas_width as f32),
            y: bbox.y,
            width: bbox.width,
            height: bbox.height,
        };
        ctx.stroke_rect(rect, color, BOX_LINE_WIDTH);

        let emotion_label = match &result.emotion {
            Some(e) => format!("{} ({:.0}%)", e.label, e.confidence * 100.0),
            None => "emotion: unknown".to_string(),
        };
        let attention_label = match looking {
            Some(true) => "Looking at camera",
            Some(false) => "Looking away",
            None => "Gaze unknown",
        };

        // Above the box, or tucked inside its top edge when there is no room.
        let top_y = if rect.y >= LABEL_HEIGHT + LABEL_GAP {
            rect.y - LABEL_GAP
        } else {
            rect.y + LABEL_HEIGHT
        };
        ctx.fill_text(&emotion_label, rect.x, top_y, color);

        let (_, canvas_height) = ctx.size();
        let below = rect.y + rect.height + LABEL_HEIGHT;
        let bottom_y = if below <= canvas_height as f32 {
            below
        } else {
            rect.y + rect.height - LABEL_GAP
        };
        ctx.fill_text(attention_label, rect.x, bottom_y, color);
    }

    /// Clear the overlay without drawing anything.
    pub fn clear<C: Canvas + ?Sized>(&self, ctx: &mut C) {
        ctx.clear();
    }
}
