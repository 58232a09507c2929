//! OS-level window targeting: resolve a process's top-level window and
//! derive template search regions from its bounds.

use tracing::{debug, instrument};

use crate::errors::AutomationError;
use crate::geometry::Region;
use crate::process;

/// Snapshot of one top-level window.
///
/// Obtained fresh per query and never retained across a sleep longer than
/// one step; the window may move, resize, or close at any time.
#[derive(Debug, Clone)]
pub struct WindowHandle {
    pub native_id: u32,
    pub pid: u32,
    pub title: String,
    pub bounds: Region,
    pub minimized: bool,
    pub maximized: bool,
}

impl WindowHandle {
    /// Default template search region for this window: its bounding box
    /// clipped to non-negative screen coordinates.
    pub fn search_region(&self) -> Result<Region, AutomationError> {
        self.bounds.clamp_to_screen()
    }
}

/// First window owned by any of `pids`, in enumeration order.
fn select_window(pids: &[u32], windows: &[WindowHandle]) -> Option<WindowHandle> {
    windows.iter().find(|w| pids.contains(&w.pid)).cloned()
}

/// Resolves and manipulates top-level windows via `xcap` plus a small
/// platform-specific activation shim.
#[derive(Clone, Default)]
pub struct WindowLocator;

impl WindowLocator {
    pub fn new() -> Self {
        Self
    }

    fn enumerate() -> Result<Vec<WindowHandle>, AutomationError> {
        let windows = xcap::Window::all()
            .map_err(|e| AutomationError::PlatformError(format!("Failed to get windows: {e}")))?;

        let mut handles = Vec::new();
        for window in &windows {
            let native_id = window
                .id()
                .map_err(|e| AutomationError::PlatformError(format!("Failed to get id: {e}")))?;
            let pid = window
                .pid()
                .map_err(|e| AutomationError::PlatformError(format!("Failed to get pid: {e}")))?;
            let title = window.title().unwrap_or_default();
            let x = window
                .x()
                .map_err(|e| AutomationError::PlatformError(format!("Failed to get x: {e}")))?;
            let y = window
                .y()
                .map_err(|e| AutomationError::PlatformError(format!("Failed to get y: {e}")))?;
            let width = window
                .width()
                .map_err(|e| AutomationError::PlatformError(format!("Failed to get width: {e}")))?;
            let height = window.height().map_err(|e| {
                AutomationError::PlatformError(format!("Failed to get height: {e}"))
            })?;
            if width == 0 || height == 0 {
                continue;
            }
            handles.push(WindowHandle {
                native_id,
                pid,
                title,
                bounds: Region::new(x, y, width, height)?,
                minimized: window.is_minimized().unwrap_or(false),
                maximized: window.is_maximized().unwrap_or(false),
            });
        }
        Ok(handles)
    }

    /// Resolve the top-level window of the named process. Process name
    /// matching is case-insensitive; no running instance or no visible
    /// window yields `WindowNotFound`.
    #[instrument(level = "debug", skip(self))]
    pub fn resolve_by_process_name(&self, name: &str) -> Result<WindowHandle, AutomationError> {
        let pids = process::pids_by_name(name);
        if pids.is_empty() {
            return Err(AutomationError::WindowNotFound(name.to_string()));
        }
        debug!(?pids, "process found, enumerating windows");

        let windows = Self::enumerate()?;
        select_window(&pids, &windows)
            .ok_or_else(|| AutomationError::WindowNotFound(name.to_string()))
    }

    /// The window that currently has input focus.
    pub fn active_window(&self) -> Result<WindowHandle, AutomationError> {
        let windows = xcap::Window::all()
            .map_err(|e| AutomationError::PlatformError(format!("Failed to get windows: {e}")))?;
        let focused = windows
            .iter()
            .position(|w| w.is_focused().unwrap_or(false))
            .ok_or_else(|| AutomationError::WindowNotFound("focused window".to_string()))?;
        // Re-enumerate through the common path to build the handle.
        let all = Self::enumerate()?;
        let id = windows[focused]
            .id()
            .map_err(|e| AutomationError::PlatformError(format!("Failed to get id: {e}")))?;
        all.into_iter()
            .find(|h| h.native_id == id)
            .ok_or_else(|| AutomationError::WindowNotFound("focused window".to_string()))
    }

    /// Restore the window if minimized, then raise it to the foreground.
    /// Best-effort: some window managers refuse foreground switches from a
    /// background process, so this returns a bool and the caller retries.
    pub fn focus(&self, handle: &WindowHandle) -> bool {
        platform::raise(handle.native_id, handle.minimized)
    }

    /// Maximize the window if it is not already maximized.
    pub fn ensure_maximized(&self, handle: &WindowHandle) -> bool {
        if handle.maximized {
            return true;
        }
        platform::maximize(handle.native_id)
    }
}

#[cfg(target_os = "windows")]
mod platform {
    use tracing::debug;

    pub(super) fn raise(native_id: u32, minimized: bool) -> bool {
        use windows::Win32::Foundation::HWND;
        use windows::Win32::UI::WindowsAndMessaging::{
            BringWindowToTop, IsIconic, SetForegroundWindow, ShowWindow, SW_RESTORE,
        };

        let hwnd = HWND(native_id as usize as *mut core::ffi::c_void);
        unsafe {
            if minimized || IsIconic(hwnd).as_bool() {
                let _ = ShowWindow(hwnd, SW_RESTORE);
            }
            let _ = BringWindowToTop(hwnd);
            let result = SetForegroundWindow(hwnd);
            if !result.as_bool() {
                debug!("SetForegroundWindow refused; caller may retry");
            }
            result.as_bool()
        }
    }

    pub(super) fn maximize(native_id: u32) -> bool {
        use windows::Win32::Foundation::HWND;
        use windows::Win32::UI::WindowsAndMessaging::{ShowWindow, SW_MAXIMIZE};

        let hwnd = HWND(native_id as usize as *mut core::ffi::c_void);
        unsafe { ShowWindow(hwnd, SW_MAXIMIZE).as_bool() }
    }
}

#[cfg(not(target_os = "windows"))]
mod platform {
    use tracing::warn;

    pub(super) fn raise(_native_id: u32, _minimized: bool) -> bool {
        warn!("window activation is not supported on this platform");
        false
    }

    pub(super) fn maximize(_native_id: u32) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(native_id: u32, pid: u32) -> WindowHandle {
        WindowHandle {
            native_id,
            pid,
            title: format!("window {native_id}"),
            bounds: Region::new(0, 0, 800, 600).unwrap(),
            minimized: false,
            maximized: false,
        }
    }

    #[test]
    fn selects_first_window_owned_by_a_matching_pid() {
        let windows = vec![handle(1, 100), handle(2, 200), handle(3, 200)];
        let selected = select_window(&[200], &windows).unwrap();
        assert_eq!(selected.native_id, 2);
        assert_eq!(selected.pid, 200);
        assert!(select_window(&[999], &windows).is_none());
    }

    #[test]
    fn resolve_unknown_process_is_window_not_found() {
        let locator = WindowLocator::new();
        let err = locator
            .resolve_by_process_name("pixelpilot-no-such-process.exe")
            .unwrap_err();
        assert!(matches!(err, AutomationError::WindowNotFound(_)));
    }

    #[test]
    fn search_region_clips_offscreen_bounds() {
        let mut h = handle(1, 1);
        h.bounds = Region::new(-40, -10, 800, 600).unwrap();
        let region = h.search_region().unwrap();
        assert_eq!((region.left, region.top), (0, 0));
        assert_eq!(region.right(), 760);
        assert_eq!(region.bottom(), 590);
    }
}
