//! Detection overlay rendering.
//!
//! Rendering is a pure translation from a `DetectionResult` plus the surface
//! geometry to a list of `DrawCommand`s. Every batch starts with a full clear, so
//! overlays never accumulate across frames. Model-space coordinates are scaled
//! per axis to the surface; the model space is never assumed to match the
//! display.

use serde::{Deserialize, Serialize};

use crate::detect::{Detection, DetectionResult, Keypoint};

/// Keypoints and skeleton edges are drawn only above this confidence.
pub const KEYPOINT_CONFIDENCE_THRESHOLD: f32 = 0.3;

/// COCO skeleton: pairs of keypoint indices joined by an edge.
pub const SKELETON_EDGES: [(usize, usize); 16] = [
    (0, 1),
    (0, 2),
    (1, 3),
    (2, 4),
    (5, 6),
    (5, 7),
    (7, 9),
    (6, 8),
    (8, 10),
    (5, 11),
    (6, 12),
    (11, 12),
    (11, 13),
    (13, 15),
    (12, 14),
    (14, 16),
];

const BOX_LINE_WIDTH: f32 = 2.0;
const SKELETON_LINE_WIDTH: f32 = 2.0;
const KEYPOINT_RADIUS: f32 = 3.0;
const LABEL_HEIGHT: f32 = 20.0;
const LABEL_GLYPH_WIDTH: f32 = 7.0;
const LABEL_PADDING: f32 = 4.0;

/// Coordinate space the inference service reports in.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelSpace {
    pub width: f32,
    pub height: f32,
}

impl Default for ModelSpace {
    fn default() -> Self {
        Self {
            width: 640.0,
            height: 640.0,
        }
    }
}

/// Pixel size of the overlay surface (matches the displayed video).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl SurfaceSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

/// Axis-aligned rectangle (origin + extent), as a canvas `strokeRect` takes it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn from_corners(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
        }
    }

    /// `[x1, y1, x2, y2]`
    pub fn corners(&self) -> [f32; 4] {
        [self.x, self.y, self.x + self.width, self.y + self.height]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Rgba(pub [u8; 4]);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Palette {
    pub box_stroke: Rgba,
    pub skeleton: Rgba,
    pub keypoint: Rgba,
    pub label_background: Rgba,
    pub label_text: Rgba,
}

pub const NORMAL_PALETTE: Palette = Palette {
    box_stroke: Rgba([0, 200, 83, 255]),
    skeleton: Rgba([0, 230, 118, 255]),
    keypoint: Rgba([105, 240, 174, 255]),
    label_background: Rgba([0, 200, 83, 220]),
    label_text: Rgba([255, 255, 255, 255]),
};

pub const ALERT_PALETTE: Palette = Palette {
    box_stroke: Rgba([229, 57, 53, 255]),
    skeleton: Rgba([255, 82, 82, 255]),
    keypoint: Rgba([255, 138, 128, 255]),
    label_background: Rgba([229, 57, 53, 220]),
    label_text: Rgba([255, 255, 255, 255]),
};

impl Palette {
    pub fn for_result(result: &DetectionResult) -> Palette {
        if result.violation_detected {
            ALERT_PALETTE
        } else {
            NORMAL_PALETTE
        }
    }
}

/// One drawing instruction for a render surface.
#[derive(Clone, Debug, PartialEq)]
pub enum DrawCommand {
    Clear {
        width: u32,
        height: u32,
    },
    StrokeRect {
        rect: Rect,
        color: Rgba,
        line_width: f32,
    },
    FillRect {
        rect: Rect,
        color: Rgba,
    },
    Line {
        from: Point,
        to: Point,
        color: Rgba,
        line_width: f32,
    },
    FillCircle {
        center: Point,
        radius: f32,
        color: Rgba,
    },
    Text {
        origin: Point,
        text: String,
        color: Rgba,
    },
}

/// Per-axis model-to-surface scale.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Scale {
    pub x: f32,
    pub y: f32,
}

impl Scale {
    pub fn between(model: ModelSpace, surface: SurfaceSize) -> Self {
        Self {
            x: surface.width as f32 / model.width,
            y: surface.height as f32 / model.height,
        }
    }

    pub fn point(&self, x: f32, y: f32) -> Point {
        Point {
            x: x * self.x,
            y: y * self.y,
        }
    }

    pub fn bbox(&self, bbox: [f32; 4]) -> Rect {
        let [x1, y1, x2, y2] = bbox;
        Rect::from_corners(x1 * self.x, y1 * self.y, x2 * self.x, y2 * self.y)
    }
}

/// Renders detections for a fixed model space.
#[derive(Clone, Copy, Debug, Default)]
pub struct OverlayRenderer {
    model_space: ModelSpace,
}

impl OverlayRenderer {
    pub fn new(model_space: ModelSpace) -> Self {
        Self { model_space }
    }

    pub fn model_space(&self) -> ModelSpace {
        self.model_space
    }

    pub fn render(&self, result: &DetectionResult, surface: SurfaceSize) -> Vec<DrawCommand> {
        render(result, surface, self.model_space)
    }

    pub fn clear(&self, surface: SurfaceSize) -> Vec<DrawCommand> {
        clear(surface)
    }
}

pub fn clear(surface: SurfaceSize) -> Vec<DrawCommand> {
    vec![DrawCommand::Clear {
        width: surface.width,
        height: surface.height,
    }]
}

/// Draw instructions for `result` on a surface of `surface` pixels.
pub fn render(result: &DetectionResult, surface: SurfaceSize, model: ModelSpace) -> Vec<DrawCommand> {
    let mut commands = clear(surface);
    if result.detections.is_empty() {
        return commands;
    }

    let scale = Scale::between(model, surface);
    let palette = Palette::for_result(result);

    for (index, detection) in result.detections.iter().enumerate() {
        let rect = scale.bbox(detection.bbox);
        commands.push(DrawCommand::StrokeRect {
            rect,
            color: palette.box_stroke,
            line_width: BOX_LINE_WIDTH,
        });
        if let Some(keypoints) = &detection.keypoints {
            draw_pose(&mut commands, keypoints, scale, &palette);
        }
        draw_label(&mut commands, index, detection, rect, &palette);
    }
    commands
}

pub fn label_text(index: usize, confidence: f32) -> String {
    format!("Person {} ({}%)", index + 1, (confidence * 100.0).round() as u32)
}

fn is_visible(keypoint: &Keypoint) -> bool {
    keypoint.confidence > KEYPOINT_CONFIDENCE_THRESHOLD
}

fn draw_pose(commands: &mut Vec<DrawCommand>, keypoints: &[Keypoint], scale: Scale, palette: &Palette) {
    for &(a, b) in SKELETON_EDGES.iter() {
        let (Some(start), Some(end)) = (keypoints.get(a), keypoints.get(b)) else {
            continue;
        };
        if !(is_visible(start) && is_visible(end)) {
            continue;
        }
        commands.push(DrawCommand::Line {
            from: scale.point(start.x, start.y),
            to: scale.point(end.x, end.y),
            color: palette.skeleton,
            line_width: SKELETON_LINE_WIDTH,
        });
    }

    for keypoint in keypoints.iter().filter(|kp| is_visible(kp)) {
        commands.push(DrawCommand::FillCircle {
            center: scale.point(keypoint.x, keypoint.y),
            radius: KEYPOINT_RADIUS,
            color: palette.keypoint,
        });
    }
}

fn draw_label(
    commands: &mut Vec<DrawCommand>,
    index: usize,
    detection: &Detection,
    rect: Rect,
    palette: &Palette,
) {
    let text = label_text(index, detection.confidence);
    let width = text.chars().count() as f32 * LABEL_GLYPH_WIDTH + 2.0 * LABEL_PADDING;
    // Above the box when there is room, otherwise just inside its top edge.
    let top = if rect.y >= LABEL_HEIGHT {
        rect.y - LABEL_HEIGHT
    } else {
        rect.y
    };
    commands.push(DrawCommand::FillRect {
        rect: Rect {
            x: rect.x,
            y: top,
            width,
            height: LABEL_HEIGHT,
        },
        color: palette.label_background,
    });
    commands.push(DrawCommand::Text {
        origin: Point {
            x: rect.x + LABEL_PADDING,
            y: top + LABEL_HEIGHT - 6.0,
        },
        text,
        color: palette.label_text,
    });
}
