//! Render surfaces the overlay draws onto.
//!
//! The host owns the visible surface and its pixel size; the controller only
//! asks for the current size and submits draw batches.

use std::collections::VecDeque;

use super::overlay::{DrawCommand, SurfaceSize};

pub trait RenderSurface: Send {
    /// Current pixel size (tracks the displayed video).
    fn size(&self) -> SurfaceSize;

    /// Apply one batch of draw commands. Each batch begins with a clear.
    fn draw(&mut self, commands: &[DrawCommand]);
}

/// Batches a `RecordingSurface` keeps by default.
pub const DEFAULT_HISTORY: usize = 64;

/// Surface that records the most recent batches; used by the demo host and tests.
///
/// Older batches are evicted once `history` is reached, so a long-running pane
/// holds a fixed amount of overlay state.
#[derive(Debug, Clone)]
pub struct RecordingSurface {
    size: SurfaceSize,
    history: usize,
    batches: VecDeque<Vec<DrawCommand>>,
    drawn: u64,
}

impl RecordingSurface {
    pub fn new(size: SurfaceSize) -> Self {
        Self::with_history(size, DEFAULT_HISTORY)
    }

    /// Keep at most `history` batches (at least one).
    pub fn with_history(size: SurfaceSize, history: usize) -> Self {
        let history = history.max(1);
        Self {
            size,
            history,
            batches: VecDeque::with_capacity(history),
            drawn: 0,
        }
    }

    /// The host resized the video element.
    pub fn resize(&mut self, size: SurfaceSize) {
        self.size = size;
    }

    /// Retained batches, oldest first.
    pub fn batches(&self) -> impl Iterator<Item = &[DrawCommand]> {
        self.batches.iter().map(Vec::as_slice)
    }

    pub fn retained(&self) -> usize {
        self.batches.len()
    }

    /// Batches drawn over the surface's lifetime, evicted ones included.
    pub fn drawn(&self) -> u64 {
        self.drawn
    }

    /// What is on screen now: the most recent batch.
    pub fn current(&self) -> &[DrawCommand] {
        self.batches.back().map(Vec::as_slice).unwrap_or(&[])
    }

    /// True when the last batch drew nothing but a clear.
    pub fn is_clear(&self) -> bool {
        self.current()
            .iter()
            .all(|c| matches!(c, DrawCommand::Clear { .. }))
    }

    /// Boxes currently on screen.
    pub fn visible_boxes(&self) -> usize {
        self.current()
            .iter()
            .filter(|c| matches!(c, DrawCommand::StrokeRect { .. }))
            .count()
    }
}

impl RenderSurface for RecordingSurface {
    fn size(&self) -> SurfaceSize {
        self.size
    }

    fn draw(&mut self, commands: &[DrawCommand]) {
        if self.batches.len() == self.history {
            self.batches.pop_front();
        }
        self.batches.push_back(commands.to_vec());
        self.drawn += 1;
    }
}

#[cfg(feature = "raster")]
pub use raster::ImageSurface;

#[cfg(feature = "raster")]
mod raster {
    use image::{Rgba, RgbaImage};

    use super::RenderSurface;
    use crate::pipeline::overlay::{self, DrawCommand, Point, Rect, SurfaceSize};

    /// Surface that rasterises overlays into a transparent RGBA image.
    ///
    /// Text is not rasterised; label backgrounds are.
    pub struct ImageSurface {
        image: RgbaImage,
    }

    impl ImageSurface {
        pub fn new(size: SurfaceSize) -> Self {
            Self {
                image: RgbaImage::new(size.width, size.height),
            }
        }

        pub fn image(&self) -> &RgbaImage {
            &self.image
        }

        pub fn save_png(&self, path: &std::path::Path) -> anyhow::Result<()> {
            self.image
                .save(path)
                .map_err(|e| anyhow::anyhow!("failed to write overlay {}: {}", path.display(), e))
        }

        fn put(&mut self, x: i64, y: i64, color: Rgba<u8>) {
            if x >= 0 && y >= 0 && (x as u32) < self.image.width() && (y as u32) < self.image.height() {
                self.image.put_pixel(x as u32, y as u32, color);
            }
        }

        fn fill_rect(&mut self, rect: Rect, color: Rgba<u8>) {
            let [x1, y1, x2, y2] = rect.corners().map(|v| v.round() as i64);
            for y in y1..y2 {
                for x in x1..x2 {
                    self.put(x, y, color);
                }
            }
        }

        fn stroke_rect(&mut self, rect: Rect, color: Rgba<u8>, width: f32) {
            let t = width.max(1.0);
            let [x1, y1, x2, y2] = rect.corners();
            self.fill_rect(Rect::from_corners(x1, y1, x2, y1 + t), color);
            self.fill_rect(Rect::from_corners(x1, y2 - t, x2, y2), color);
            self.fill_rect(Rect::from_corners(x1, y1, x1 + t, y2), color);
            self.fill_rect(Rect::from_corners(x2 - t, y1, x2, y2), color);
        }

        fn line(&mut self, from: Point, to: Point, color: Rgba<u8>) {
            let (mut x0, mut y0) = (from.x.round() as i64, from.y.round() as i64);
            let (x1, y1) = (to.x.round() as i64, to.y.round() as i64);
            let dx = (x1 - x0).abs();
            let dy = -(y1 - y0).abs();
            let sx = if x0 < x1 { 1 } else { -1 };
            let sy = if y0 < y1 { 1 } else { -1 };
            let mut err = dx + dy;
            loop {
                self.put(x0, y0, color);
                if x0 == x1 && y0 == y1 {
                    break;
                }
                let e2 = 2 * err;
                if e2 >= dy {
                    err += dy;
                    x0 += sx;
                }
                if e2 <= dx {
                    err += dx;
                    y0 += sy;
                }
            }
        }

        fn fill_circle(&mut self, center: Point, radius: f32, color: Rgba<u8>) {
            let r = radius.ceil() as i64;
            let (cx, cy) = (center.x.round() as i64, center.y.round() as i64);
            for dy in -r..=r {
                for dx in -r..=r {
                    if ((dx * dx + dy * dy) as f32) <= radius * radius {
                        self.put(cx + dx, cy + dy, color);
                    }
                }
            }
        }
    }

    impl RenderSurface for ImageSurface {
        fn size(&self) -> SurfaceSize {
            SurfaceSize::new(self.image.width(), self.image.height())
        }

        fn draw(&mut self, commands: &[DrawCommand]) {
            for command in commands {
                match command {
                    DrawCommand::Clear { .. } => {
                        for pixel in self.image.pixels_mut() {
                            *pixel = Rgba([0, 0, 0, 0]);
                        }
                    }
                    DrawCommand::StrokeRect {
                        rect,
                        color,
                        line_width,
                    } => self.stroke_rect(*rect, Rgba(color.0), *line_width),
                    DrawCommand::FillRect { rect, color } => self.fill_rect(*rect, Rgba(color.0)),
                    DrawCommand::Line {
                        from, to, color, ..
                    } => self.line(*from, *to, Rgba(color.0)),
                    DrawCommand::FillCircle {
                        center,
                        radius,
                        color,
                    } => self.fill_circle(*center, *radius, Rgba(color.0)),
                    DrawCommand::Text { .. } => {}
                }
            }
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::overlay::{clear, Rect, Rgba};

    #[test]
    fn recording_surface_reports_the_latest_batch() {
        let mut surface = RecordingSurface::new(SurfaceSize::new(640, 360));
        assert!(surface.is_clear());

        surface.draw(&[
            DrawCommand::Clear {
                width: 640,
                height: 360,
            },
            DrawCommand::StrokeRect {
                rect: Rect::from_corners(0.0, 0.0, 10.0, 10.0),
                color: Rgba([0, 0, 0, 255]),
                line_width: 1.0,
            },
        ]);
        assert_eq!(surface.visible_boxes(), 1);
        assert!(!surface.is_clear());

        surface.draw(&clear(surface.size()));
        assert!(surface.is_clear());
        assert_eq!(surface.retained(), 2);
    }

    #[test]
    fn recording_surface_evicts_oldest_batches_past_its_history() {
        let mut surface = RecordingSurface::with_history(SurfaceSize::new(64, 48), 4);
        for i in 0..10 {
            surface.draw(&[
                DrawCommand::Clear {
                    width: 64,
                    height: 48,
                },
                DrawCommand::StrokeRect {
                    rect: Rect::from_corners(i as f32, 0.0, i as f32 + 1.0, 1.0),
                    color: Rgba([0, 0, 0, 255]),
                    line_width: 1.0,
                },
            ]);
        }
        assert_eq!(surface.retained(), 4);
        assert_eq!(surface.drawn(), 10);
        assert_eq!(surface.visible_boxes(), 1);

        let oldest = surface.batches().next().unwrap();
        assert!(matches!(
            &oldest[1],
            DrawCommand::StrokeRect { rect, .. } if *rect == Rect::from_corners(6.0, 0.0, 7.0, 1.0)
        ));

        surface.draw(&clear(surface.size()));
        assert!(surface.is_clear());
        assert_eq!(surface.retained(), 4);
    }
}
