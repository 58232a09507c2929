//! Template matching: find a reference image inside a captured frame.
//!
//! Matching is exact-template only, via zero-mean normalized
//! cross-correlation on grayscale pixels. There is no general object
//! detection and no tolerance for display scaling beyond the authored
//! assets; light/dark UI themes are handled by authoring one asset per
//! theme and probing them with [`TemplateMatcher::locate_any`].

use std::path::PathBuf;
use std::sync::Arc;

use image::RgbaImage;
use tracing::{debug, instrument};

use crate::capture::{Frame, ScreenSource};
use crate::errors::AutomationError;
use crate::geometry::Region;

const DEFAULT_MIN_CONFIDENCE: f32 = 0.8;

/// Reference to an on-disk template asset plus its confidence floor.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateRef {
    pub path: PathBuf,
    pub min_confidence: f32,
}

impl TemplateRef {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            min_confidence: DEFAULT_MIN_CONFIDENCE,
        }
    }

    pub fn with_confidence(mut self, min_confidence: f32) -> Self {
        self.min_confidence = min_confidence.clamp(0.0, 1.0);
        self
    }

    /// Short name for logs: the file stem of the asset.
    pub fn label(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Best-scoring template location, in absolute screen coordinates.
///
/// Ephemeral: valid only for the instant of capture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Match {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub score: f32,
}

impl Match {
    pub fn center(&self) -> (i32, i32) {
        (
            self.x + (self.width / 2) as i32,
            self.y + (self.height / 2) as i32,
        )
    }
}

struct GrayBuf {
    data: Vec<f32>,
    width: u32,
    height: u32,
}

fn to_gray(image: &RgbaImage) -> GrayBuf {
    let data = image
        .pixels()
        .map(|p| 0.299 * p.0[0] as f32 + 0.587 * p.0[1] as f32 + 0.114 * p.0[2] as f32)
        .collect();
    GrayBuf {
        data,
        width: image.width(),
        height: image.height(),
    }
}

fn load_template(template: &TemplateRef) -> Result<GrayBuf, AutomationError> {
    if !template.path.exists() {
        return Err(AutomationError::AssetMissing(
            template.path.display().to_string(),
        ));
    }
    let image = image::open(&template.path)
        .map_err(|e| {
            AutomationError::AssetMissing(format!("{}: {e}", template.path.display()))
        })?
        .to_rgba8();
    Ok(to_gray(&image))
}

/// Zero-mean normalized cross-correlation over every placement of `tmpl`
/// inside `frame`. Returns the single global maximum; ties resolve to the
/// first placement in raster scan order.
fn best_correlation(frame: &GrayBuf, tmpl: &GrayBuf) -> Option<(u32, u32, f32)> {
    if tmpl.width > frame.width || tmpl.height > frame.height {
        return None;
    }

    let n = (tmpl.width * tmpl.height) as f32;
    let t_mean = tmpl.data.iter().sum::<f32>() / n;
    let t_centered: Vec<f32> = tmpl.data.iter().map(|v| v - t_mean).collect();
    let t_norm = t_centered.iter().map(|v| v * v).sum::<f32>().sqrt();
    if t_norm <= f32::EPSILON {
        // Flat template carries no signal to correlate against.
        return None;
    }

    let mut best: Option<(u32, u32, f32)> = None;
    for v in 0..=(frame.height - tmpl.height) {
        for u in 0..=(frame.width - tmpl.width) {
            let mut cross = 0.0f32;
            let mut win_sum = 0.0f32;
            let mut win_sq = 0.0f32;
            for ty in 0..tmpl.height {
                let frow = ((v + ty) * frame.width + u) as usize;
                let trow = (ty * tmpl.width) as usize;
                for tx in 0..tmpl.width as usize {
                    let f = frame.data[frow + tx];
                    cross += f * t_centered[trow + tx];
                    win_sum += f;
                    win_sq += f * f;
                }
            }
            let win_var = win_sq - win_sum * win_sum / n;
            if win_var <= f32::EPSILON {
                continue;
            }
            let score = cross / (win_var.sqrt() * t_norm);
            if best.map(|(_, _, s)| score > s).unwrap_or(true) {
                best = Some((u, v, score));
            }
        }
    }
    best
}

/// Finds template assets inside captured screen regions.
///
/// Pure function of current screen state: no side effects beyond the
/// transient frame capture, and idempotent against an unchanged frame.
#[derive(Clone)]
pub struct TemplateMatcher {
    screen: Arc<dyn ScreenSource>,
}

impl TemplateMatcher {
    pub fn new(screen: Arc<dyn ScreenSource>) -> Self {
        Self { screen }
    }

    /// Locate `template` inside `region`. Returns `None` when the best
    /// correlation falls below the template's confidence floor; a missing
    /// asset file is a fatal `AssetMissing`, not a match failure.
    #[instrument(level = "debug", skip(self, template, region), fields(template = %template.label()))]
    pub fn locate(
        &self,
        template: &TemplateRef,
        region: &Region,
    ) -> Result<Option<Match>, AutomationError> {
        let tmpl = load_template(template)?;
        let frame = self.screen.capture_region(region)?;
        self.locate_in_frame(template, &tmpl, &frame)
    }

    /// Try each template in list order and return the first hit, tagged with
    /// the index of the template that matched. Used for controls that render
    /// different pixels per UI theme.
    pub fn locate_any(
        &self,
        templates: &[TemplateRef],
        region: &Region,
    ) -> Result<Option<(usize, Match)>, AutomationError> {
        for (index, template) in templates.iter().enumerate() {
            if let Some(found) = self.locate(template, region)? {
                return Ok(Some((index, found)));
            }
        }
        Ok(None)
    }

    fn locate_in_frame(
        &self,
        template: &TemplateRef,
        tmpl: &GrayBuf,
        frame: &Frame,
    ) -> Result<Option<Match>, AutomationError> {
        let gray = to_gray(&frame.image);
        let Some((u, v, score)) = best_correlation(&gray, tmpl) else {
            return Ok(None);
        };
        debug!(score, u, v, "best correlation");
        if score < template.min_confidence {
            return Ok(None);
        }
        Ok(Some(Match {
            x: frame.origin.0 + u as i32,
            y: frame.origin.1 + v as i32,
            width: tmpl.width,
            height: tmpl.height,
            score,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use std::path::Path;

    /// Serves a fixed image as the screen; regions index into it.
    pub(crate) struct FakeScreen {
        image: RgbaImage,
    }

    impl FakeScreen {
        pub(crate) fn new(image: RgbaImage) -> Self {
            Self { image }
        }
    }

    impl ScreenSource for FakeScreen {
        fn capture_region(&self, region: &Region) -> Result<Frame, AutomationError> {
            let bounds = Region::new(0, 0, self.image.width(), self.image.height())?;
            let visible = region.intersect(&bounds).ok_or_else(|| {
                AutomationError::InvalidRegion(format!("{region:?} outside fake screen"))
            })?;
            let cropped = image::imageops::crop_imm(
                &self.image,
                visible.left as u32,
                visible.top as u32,
                visible.width,
                visible.height,
            )
            .to_image();
            Ok(Frame {
                origin: (visible.left, visible.top),
                image: cropped,
            })
        }
    }

    /// Deterministic speckle so windows elsewhere in the frame cannot
    /// accidentally correlate.
    fn speckle(width: u32, height: u32, seed: u32) -> RgbaImage {
        let mut state = seed.wrapping_mul(2654435761).wrapping_add(1);
        RgbaImage::from_fn(width, height, |_, _| {
            state = state.wrapping_mul(1664525).wrapping_add(1013904223);
            let v = (state >> 24) as u8;
            Rgba([v, v.wrapping_add(40), v.wrapping_add(80), 255])
        })
    }

    fn screen_with_patch(patch: &RgbaImage, at: (i64, i64)) -> FakeScreen {
        let mut canvas = RgbaImage::from_pixel(160, 120, Rgba([30, 30, 30, 255]));
        image::imageops::overlay(&mut canvas, patch, at.0, at.1);
        FakeScreen::new(canvas)
    }

    fn save_template(dir: &Path, name: &str, image: &RgbaImage) -> TemplateRef {
        let path = dir.join(name);
        image.save(&path).unwrap();
        TemplateRef::new(path)
    }

    #[test]
    fn locates_patch_at_exact_position() {
        let dir = tempfile::tempdir().unwrap();
        let patch = speckle(12, 8, 7);
        let screen = screen_with_patch(&patch, (47, 31));
        let template = save_template(dir.path(), "patch.png", &patch);
        let matcher = TemplateMatcher::new(Arc::new(screen));

        let region = Region::new(0, 0, 160, 120).unwrap();
        let found = matcher.locate(&template, &region).unwrap().unwrap();
        assert!((found.x - 47).abs() <= 1, "x = {}", found.x);
        assert!((found.y - 31).abs() <= 1, "y = {}", found.y);
        assert!(found.score >= 0.8);
        assert_eq!((found.width, found.height), (12, 8));
    }

    #[test]
    fn match_coordinates_are_absolute_when_region_is_offset() {
        let dir = tempfile::tempdir().unwrap();
        let patch = speckle(10, 10, 3);
        let screen = screen_with_patch(&patch, (80, 60));
        let template = save_template(dir.path(), "patch.png", &patch);
        let matcher = TemplateMatcher::new(Arc::new(screen));

        let region = Region::new(60, 40, 80, 60).unwrap();
        let found = matcher.locate(&template, &region).unwrap().unwrap();
        assert_eq!((found.x, found.y), (80, 60));
    }

    #[test]
    fn locate_is_idempotent_against_unchanged_frame() {
        let dir = tempfile::tempdir().unwrap();
        let patch = speckle(12, 8, 7);
        let screen = screen_with_patch(&patch, (47, 31));
        let template = save_template(dir.path(), "patch.png", &patch);
        let matcher = TemplateMatcher::new(Arc::new(screen));

        let region = Region::new(0, 0, 160, 120).unwrap();
        let first = matcher.locate(&template, &region).unwrap();
        let second = matcher.locate(&template, &region).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn absent_template_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let present = speckle(12, 8, 7);
        let absent = speckle(12, 8, 99);
        let screen = screen_with_patch(&present, (47, 31));
        let template = save_template(dir.path(), "absent.png", &absent);
        let matcher = TemplateMatcher::new(Arc::new(screen));

        let region = Region::new(0, 0, 160, 120).unwrap();
        assert!(matcher.locate(&template, &region).unwrap().is_none());
    }

    #[test]
    fn locate_any_picks_the_theme_variant_that_is_on_screen() {
        let dir = tempfile::tempdir().unwrap();
        let light = speckle(12, 8, 21);
        let dark = speckle(12, 8, 77);
        let screen = screen_with_patch(&dark, (20, 20));
        let light_ref = save_template(dir.path(), "light.png", &light);
        let dark_ref = save_template(dir.path(), "dark.png", &dark);
        let matcher = TemplateMatcher::new(Arc::new(screen));

        let region = Region::new(0, 0, 160, 120).unwrap();
        let (index, found) = matcher
            .locate_any(&[light_ref, dark_ref], &region)
            .unwrap()
            .unwrap();
        assert_eq!(index, 1);
        assert_eq!((found.x, found.y), (20, 20));
    }

    #[test]
    fn missing_asset_is_fatal() {
        let screen = screen_with_patch(&speckle(8, 8, 1), (0, 0));
        let matcher = TemplateMatcher::new(Arc::new(screen));
        let template = TemplateRef::new("/nonexistent/button.png");
        let region = Region::new(0, 0, 160, 120).unwrap();
        let err = matcher.locate(&template, &region).unwrap_err();
        assert!(matches!(err, AutomationError::AssetMissing(_)));
        assert!(err.is_fatal());
    }
}
