//! Frame capture over the `xcap` screen-capture backend.

use std::path::{Path, PathBuf};

use image::RgbaImage;
use tracing::{debug, info};

use crate::errors::AutomationError;
use crate::geometry::Region;

/// A captured pixel buffer plus the screen-space origin it was taken from.
///
/// Valid only for the instant of capture; never persisted or reused across
/// steps.
#[derive(Debug, Clone)]
pub struct Frame {
    pub origin: (i32, i32),
    pub image: RgbaImage,
}

/// Source of screen pixels. The production implementation captures via
/// `xcap`; tests substitute synthetic frames.
pub trait ScreenSource: Send + Sync {
    /// Capture the pixel content of `region`. The region must already be
    /// clamped to non-negative coordinates.
    fn capture_region(&self, region: &Region) -> Result<Frame, AutomationError>;
}

/// Captures from the physical display via `xcap::Monitor`.
pub struct XcapScreen;

impl XcapScreen {
    pub fn new() -> Self {
        Self
    }

    fn monitor_for(region: &Region) -> Result<(xcap::Monitor, Region), AutomationError> {
        let monitors = xcap::Monitor::all()
            .map_err(|e| AutomationError::CaptureFailed(format!("Failed to get monitors: {e}")))?;
        if monitors.is_empty() {
            return Err(AutomationError::CaptureFailed(
                "no active display".to_string(),
            ));
        }

        let (cx, cy) = region.center();
        let mut fallback: Option<(xcap::Monitor, Region)> = None;
        for monitor in monitors {
            let x = monitor.x().map_err(|e| {
                AutomationError::CaptureFailed(format!("Failed to get monitor x: {e}"))
            })?;
            let y = monitor.y().map_err(|e| {
                AutomationError::CaptureFailed(format!("Failed to get monitor y: {e}"))
            })?;
            let width = monitor.width().map_err(|e| {
                AutomationError::CaptureFailed(format!("Failed to get monitor width: {e}"))
            })?;
            let height = monitor.height().map_err(|e| {
                AutomationError::CaptureFailed(format!("Failed to get monitor height: {e}"))
            })?;
            let bounds = Region::new(x, y, width, height)?;
            let is_primary = monitor.is_primary().unwrap_or(false);
            if bounds.contains(cx, cy) {
                return Ok((monitor, bounds));
            }
            if is_primary || fallback.is_none() {
                fallback = Some((monitor, bounds));
            }
        }
        fallback.ok_or_else(|| AutomationError::CaptureFailed("no usable monitor".to_string()))
    }
}

impl Default for XcapScreen {
    fn default() -> Self {
        Self::new()
    }
}

impl ScreenSource for XcapScreen {
    fn capture_region(&self, region: &Region) -> Result<Frame, AutomationError> {
        let (monitor, bounds) = Self::monitor_for(region)?;
        let visible = region.intersect(&bounds).ok_or_else(|| {
            AutomationError::InvalidRegion(format!("region {region:?} outside monitor {bounds:?}"))
        })?;

        let image = monitor.capture_image().map_err(|e| {
            AutomationError::CaptureFailed(format!("Failed to capture monitor: {e}"))
        })?;

        let crop_x = (visible.left - bounds.left) as u32;
        let crop_y = (visible.top - bounds.top) as u32;
        let cropped =
            image::imageops::crop_imm(&image, crop_x, crop_y, visible.width, visible.height)
                .to_image();

        debug!(
            left = visible.left,
            top = visible.top,
            width = visible.width,
            height = visible.height,
            "captured region"
        );

        Ok(Frame {
            origin: (visible.left, visible.top),
            image: cropped,
        })
    }
}

/// Persist a snapshot of `region` to `dir` for post-mortem inspection.
/// Filenames are timestamp-qualified; nothing ever reads these back.
pub fn save_region_snapshot(
    source: &dyn ScreenSource,
    region: &Region,
    dir: &Path,
) -> Result<PathBuf, AutomationError> {
    let frame = source.capture_region(region)?;
    std::fs::create_dir_all(dir)
        .map_err(|e| AutomationError::PlatformError(format!("Failed to create {dir:?}: {e}")))?;
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let path = dir.join(format!("region_{stamp}.png"));
    frame
        .image
        .save(&path)
        .map_err(|e| AutomationError::PlatformError(format!("Failed to save snapshot: {e}")))?;
    info!("region snapshot saved to {}", path.display());
    Ok(path)
}
