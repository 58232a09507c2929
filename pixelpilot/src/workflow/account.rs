//! Account-deletion procedure: reach the browser settings page from the
//! target application and walk its delete confirmation dialog.

use std::time::Duration;

use crate::errors::AutomationError;
use crate::geometry::Region;
use crate::step::StepSpec;
use crate::window::WindowHandle;

use super::{ensure_app_running, LogLevel, Session};

const SECOND: Duration = Duration::from_secs(1);

/// Literal the settings page requires in the confirmation input.
const CONFIRM_TOKEN: &str = "delete";

pub(super) async fn run(s: &Session) -> Result<(), AutomationError> {
    ensure_app_running(s).await?;
    open_browser_settings(s).await?;
    delete_account(s).await
}

/// The gear control lives in the window's top-right corner; searching only
/// that slice keeps the match away from look-alike icons elsewhere.
fn settings_corner(app: &WindowHandle) -> Result<Region, AutomationError> {
    let bounds = app.bounds;
    let width = bounds.width.min(800);
    Region::new(
        bounds.right() - width as i32,
        bounds.top,
        width,
        bounds.height.min(300),
    )?
    .clamp_to_screen()
}

async fn open_browser_settings(s: &Session) -> Result<(), AutomationError> {
    let app = s.focus_app().await?;
    let corner = settings_corner(&app)?;
    s.click_any_step(
        &StepSpec::new("open-app-settings", 8, SECOND),
        &s.assets.setting_button(),
        move || Ok(corner),
    )
    .await?;

    // Either control routes to the account page in the browser.
    let full = app.search_region()?;
    match s.find_any(&s.assets.manage_button(), &full)? {
        Some(manage) => s.click_match(&manage).await?,
        None => {
            s.click_any_step(
                &StepSpec::new("find-sign-control", 5, SECOND),
                &s.assets.sign_button(),
                move || Ok(full),
            )
            .await?;
        }
    }

    let browser = s.wait_for_browser().await?;
    s.prepare_browser(&browser).await?;
    wait_for_settings_page(s).await
}

/// Search region of whichever window currently has focus. Always resolved
/// inside a retry envelope: a momentary focus loss is transient, not fatal.
fn active_region(s: &Session) -> Result<Region, AutomationError> {
    s.windows.active_window()?.search_region()
}

/// Wait until the settings page renders, steering the browser to its URL
/// whenever it is elsewhere.
async fn wait_for_settings_page(s: &Session) -> Result<(), AutomationError> {
    let spec = StepSpec::new("settings-page", 8, SECOND);
    s.steps
        .run(&spec, |attempt| async move {
            let region = active_region(s)?;
            if s
                .find_any(&s.assets.settings_page_marker(), &region)?
                .is_some()
            {
                return Ok(Some(()));
            }
            if attempt == 1 || !s.current_url().await?.contains("/settings") {
                s.navigate(&s.targets.settings_url).await?;
            }
            Ok(None)
        })
        .await
}

async fn delete_account(s: &Session) -> Result<(), AutomationError> {
    // The delete control may sit behind a collapsed advanced section; one
    // envelope covers both reaching and clicking it.
    let spec = StepSpec::new("delete-account", 8, SECOND);
    s.steps
        .run(&spec, |_| async move {
            let region = active_region(s)?;
            if let Some(hit) = s.find_any(&s.assets.delete_button(), &region)? {
                s.click_match(&hit).await?;
                return Ok(Some(()));
            }
            if let Some(advanced) = s.find_any(&s.assets.advanced_button(), &region)? {
                s.click_match(&advanced).await?;
            }
            Ok(None)
        })
        .await?;

    s.click_any_step(
        &StepSpec::new("confirm-input", 8, SECOND),
        &s.assets.confirm_input(),
        || active_region(s),
    )
    .await?;
    s.actions.paste_text(CONFIRM_TOKEN).await?;
    s.click_any_step(
        &StepSpec::new("confirm-delete", 8, SECOND),
        &s.assets.delete_confirm_button(),
        || active_region(s),
    )
    .await?;
    s.pace(SECOND).await;
    s.emit(LogLevel::Info, "account deletion confirmed");
    Ok(())
}
