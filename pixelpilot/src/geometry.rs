//! Screen-space rectangles used as template search regions.

use serde::{Deserialize, Serialize};

use crate::errors::AutomationError;

/// A screen-relative search rectangle.
///
/// The origin may be negative while a window hangs off the left/top edge of
/// the desktop; [`Region::clamp_to_screen`] clips it before capture. A region
/// is computed fresh per step from the current window bounds and never cached
/// across steps, since the window may move or resize in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(left: i32, top: i32, width: u32, height: u32) -> Result<Self, AutomationError> {
        if width == 0 || height == 0 {
            return Err(AutomationError::InvalidRegion(format!(
                "zero-sized region {width}x{height} at ({left}, {top})"
            )));
        }
        Ok(Self {
            left,
            top,
            width,
            height,
        })
    }

    pub fn right(&self) -> i32 {
        self.left + self.width as i32
    }

    pub fn bottom(&self) -> i32 {
        self.top + self.height as i32
    }

    pub fn center(&self) -> (i32, i32) {
        (
            self.left + (self.width / 2) as i32,
            self.top + (self.height / 2) as i32,
        )
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.left && x < self.right() && y >= self.top && y < self.bottom()
    }

    /// Clip off-screen negative coordinates to 0, shrinking the rectangle so
    /// its right/bottom edges stay put. Capture backends reject negative
    /// origins, so this runs on every window-derived region.
    pub fn clamp_to_screen(&self) -> Result<Self, AutomationError> {
        let left = self.left.max(0);
        let top = self.top.max(0);
        let width = (self.right() - left).max(0) as u32;
        let height = (self.bottom() - top).max(0) as u32;
        if width == 0 || height == 0 {
            return Err(AutomationError::InvalidRegion(format!(
                "region {self:?} is entirely off-screen"
            )));
        }
        Ok(Self {
            left,
            top,
            width,
            height,
        })
    }

    /// Intersection with another rectangle, if non-empty.
    pub fn intersect(&self, other: &Region) -> Option<Region> {
        let left = self.left.max(other.left);
        let top = self.top.max(other.top);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right <= left || bottom <= top {
            return None;
        }
        Some(Region {
            left,
            top,
            width: (right - left) as u32,
            height: (bottom - top) as u32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_sized_region() {
        assert!(Region::new(0, 0, 0, 100).is_err());
        assert!(Region::new(0, 0, 100, 0).is_err());
    }

    #[test]
    fn clamps_negative_origin_and_keeps_far_edges() {
        let region = Region::new(-50, -20, 200, 100).unwrap();
        let clamped = region.clamp_to_screen().unwrap();
        assert_eq!(clamped.left, 0);
        assert_eq!(clamped.top, 0);
        assert_eq!(clamped.right(), 150);
        assert_eq!(clamped.bottom(), 80);
    }

    #[test]
    fn fully_offscreen_region_is_invalid() {
        let region = Region::new(-300, -300, 100, 100).unwrap();
        assert!(region.clamp_to_screen().is_err());
    }

    #[test]
    fn intersect_overlapping() {
        let a = Region::new(0, 0, 100, 100).unwrap();
        let b = Region::new(50, 50, 100, 100).unwrap();
        let i = a.intersect(&b).unwrap();
        assert_eq!(i, Region::new(50, 50, 50, 50).unwrap());
        assert!(a
            .intersect(&Region::new(200, 200, 10, 10).unwrap())
            .is_none());
    }
}
