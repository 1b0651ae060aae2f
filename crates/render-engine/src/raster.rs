//! Rasterizes frame compositions into RGBA buffers.

use std::path::{Path, PathBuf};

use ab_glyph::{FontArc, PxScale};
use anyhow::Context;
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect as PixelRect;
use storyreel_common::StoryreelResult;

use crate::compositor::{fit_rect, overlay_anchor_y, FrameComposition, PlaceholderCard};

const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);
const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const CARD_BACKGROUND: Rgba<u8> = Rgba([30, 30, 40, 255]);
const CARD_SUBTITLE: Rgba<u8> = Rgba([170, 170, 185, 255]);

/// Overlay font sizes are authored against a 720-line preview.
const REFERENCE_HEIGHT: f32 = 720.0;

const SYSTEM_FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Bold.ttf",
    "/Library/Fonts/Arial Bold.ttf",
    "/System/Library/Fonts/Supplemental/Arial Bold.ttf",
    "C:\\Windows\\Fonts\\arialbd.ttf",
];

/// Load a TTF/OTF font from disk.
pub fn load_font(path: &Path) -> StoryreelResult<FontArc> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read font {}", path.display()))?;
    let font = FontArc::try_from_vec(bytes)
        .with_context(|| format!("Failed to parse font {}", path.display()))?;
    Ok(font)
}

/// First bold sans font found in the usual system locations.
pub fn find_system_font() -> Option<PathBuf> {
    SYSTEM_FONT_CANDIDATES
        .iter()
        .map(|p| PathBuf::from(*p))
        .find(|p| p.is_file())
}

/// Draws compositions onto a fixed-size canvas.
#[derive(Clone)]
pub struct FrameRenderer {
    width: u32,
    height: u32,
    font: Option<FontArc>,
}

impl FrameRenderer {
    pub fn new(width: u32, height: u32, font: Option<FontArc>) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            font,
        }
    }

    /// Build a renderer with the configured font, or a system font when none
    /// is configured. A configured font that fails to load is an error.
    pub fn with_font_file(width: u32, height: u32, font_path: Option<&Path>) -> StoryreelResult<Self> {
        let font = match font_path {
            Some(path) => Some(load_font(path)?),
            None => match find_system_font() {
                Some(path) => {
                    tracing::debug!(path = %path.display(), "Using system font");
                    load_font(&path).ok()
                }
                None => {
                    tracing::warn!("No font available; text overlays will not be drawn");
                    None
                }
            },
        };
        Ok(Self::new(width, height, font))
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Render one frame. `video` is the decoded source frame for the
    /// composition's video layer; `None` draws the placeholder card.
    pub fn render(&self, composition: &FrameComposition, video: Option<&RgbaImage>) -> RgbaImage {
        let mut canvas = RgbaImage::from_pixel(self.width, self.height, BLACK);

        match video {
            Some(frame) => self.draw_video(&mut canvas, frame),
            None => self.draw_placeholder(&mut canvas, &composition.placeholder),
        }

        for overlay in &composition.overlays {
            let size = overlay.font_size * self.height as f32 / REFERENCE_HEIGHT;
            let center_y = overlay_anchor_y(overlay.position, self.height);
            self.draw_outlined_text(&mut canvas, &overlay.text, size, center_y);
        }

        canvas
    }

    fn draw_video(&self, canvas: &mut RgbaImage, frame: &RgbaImage) {
        let rect = fit_rect(frame.width(), frame.height(), self.width, self.height);
        if rect.width == frame.width() && rect.height == frame.height() {
            imageops::overlay(canvas, frame, rect.x as i64, rect.y as i64);
        } else {
            let scaled = imageops::resize(frame, rect.width, rect.height, FilterType::Triangle);
            imageops::overlay(canvas, &scaled, rect.x as i64, rect.y as i64);
        }
    }

    fn draw_placeholder(&self, canvas: &mut RgbaImage, card: &PlaceholderCard) {
        draw_filled_rect_mut(
            canvas,
            PixelRect::at(0, 0).of_size(self.width, self.height),
            CARD_BACKGROUND,
        );
        let Some(font) = &self.font else {
            return;
        };

        let title_size = self.height as f32 / 12.0;
        let clock_size = self.height as f32 / 24.0;
        let title_y = (self.height as f32 * 0.45) as i32;
        let clock_y = (self.height as f32 * 0.58) as i32;
        self.draw_centered(canvas, font, &card.title, title_size, title_y, WHITE);
        self.draw_centered(canvas, font, &card.clock, clock_size, clock_y, CARD_SUBTITLE);
    }

    fn draw_centered(
        &self,
        canvas: &mut RgbaImage,
        font: &FontArc,
        text: &str,
        size: f32,
        center_y: i32,
        color: Rgba<u8>,
    ) {
        let scale = PxScale::from(size.max(1.0));
        let (w, h) = text_size(scale, font, text);
        let x = (self.width as i32 - w as i32) / 2;
        let y = center_y - h as i32 / 2;
        draw_text_mut(canvas, color, x, y, scale, font, text);
    }

    /// White text with a black stroke, horizontally centered on the canvas.
    fn draw_outlined_text(&self, canvas: &mut RgbaImage, text: &str, size: f32, center_y: i32) {
        let Some(font) = &self.font else {
            return;
        };
        if text.trim().is_empty() {
            return;
        }

        let scale = PxScale::from(size.max(1.0));
        let (w, h) = text_size(scale, font, text);
        let x = (self.width as i32 - w as i32) / 2;
        let y = center_y - h as i32 / 2;
        let stroke = ((size / 16.0).round() as i32).max(2);

        for dy in -stroke..=stroke {
            for dx in -stroke..=stroke {
                if (dx != 0 || dy != 0) && dx * dx + dy * dy <= stroke * stroke {
                    draw_text_mut(canvas, BLACK, x + dx, y + dy, scale, font, text);
                }
            }
        }
        draw_text_mut(canvas, WHITE, x, y, scale, font, text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::{OverlayLayer, VideoLayer};
    use storyreel_project_model::OverlayPosition;

    fn composition(video: bool) -> FrameComposition {
        FrameComposition {
            frame_index: 0,
            time_secs: 0.0,
            video: video.then(|| VideoLayer {
                clip_id: "c".into(),
                source_url: "c.mp4".into(),
                local_time: 0.0,
            }),
            placeholder: PlaceholderCard::new("Demo", 0.0, 5.0),
            overlays: Vec::new(),
        }
    }

    #[test]
    fn test_video_is_letterboxed() {
        let renderer = FrameRenderer::new(160, 90, None);
        let red = RgbaImage::from_pixel(200, 50, Rgba([255, 0, 0, 255]));
        let frame = renderer.render(&composition(true), Some(&red));

        assert_eq!(frame.dimensions(), (160, 90));
        // 200x50 fits as 160x40 starting at y = 25.
        assert_eq!(*frame.get_pixel(80, 45), Rgba([255, 0, 0, 255]));
        assert_eq!(*frame.get_pixel(80, 5), BLACK);
        assert_eq!(*frame.get_pixel(80, 85), BLACK);
    }

    #[test]
    fn test_exact_size_frame_is_copied() {
        let renderer = FrameRenderer::new(4, 4, None);
        let mut src = RgbaImage::from_pixel(4, 4, WHITE);
        src.put_pixel(0, 0, Rgba([1, 2, 3, 255]));
        let frame = renderer.render(&composition(true), Some(&src));
        assert_eq!(*frame.get_pixel(0, 0), Rgba([1, 2, 3, 255]));
    }

    #[test]
    fn test_missing_video_draws_placeholder_card() {
        let renderer = FrameRenderer::new(64, 36, None);
        let frame = renderer.render(&composition(false), None);
        assert_eq!(*frame.get_pixel(0, 0), CARD_BACKGROUND);
        assert_eq!(*frame.get_pixel(63, 35), CARD_BACKGROUND);
    }

    #[test]
    fn test_overlays_without_font_are_skipped() {
        let renderer = FrameRenderer::new(32, 18, None);
        let mut comp = composition(false);
        comp.overlays.push(OverlayLayer {
            text: "Hello".into(),
            font_size: 32.0,
            position: OverlayPosition::Bottom,
        });
        let frame = renderer.render(&comp, None);
        assert!(frame.pixels().all(|p| *p == CARD_BACKGROUND));
    }

    #[test]
    fn test_missing_font_file_is_an_error() {
        let result = FrameRenderer::with_font_file(
            16,
            9,
            Some(Path::new("/nonexistent/storyreel-font.ttf")),
        );
        assert!(result.is_err());
    }
}
