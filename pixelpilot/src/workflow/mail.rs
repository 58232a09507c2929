//! Mailbox detour: open the webmail client in a fresh browser window, wait
//! for the verification email, and lift the code out of its body.
//!
//! The code is never OCR'd. The two fixed anchor phrases around it are
//! highlighted via find-in-page so they render in a style the marker
//! templates match, the text between the anchors is drag-selected with
//! fixed offsets from the marker positions, and the selection is read back
//! through the clipboard.

use std::time::Duration;

use crate::errors::AutomationError;
use crate::geometry::Region;
use crate::input::Key;
use crate::step::StepSpec;

use super::{LogLevel, Session};

const CODE_START_ANCHOR: &str = "Your one-time code is:";
const CODE_END_ANCHOR: &str = "This code expires in";

/// Selection offsets relative to the anchor-marker top-left corners,
/// calibrated against the sender's fixed email layout.
const DRAG_START_OFFSET: (i32, i32) = (-10, -10);
const DRAG_END_OFFSET: (i32, i32) = (110, 30);

pub(super) async fn retrieve_code(s: &Session) -> Result<String, AutomationError> {
    s.emit(LogLevel::Info, "opening mailbox for the verification code");
    // A fresh window keeps the auth tab untouched underneath.
    s.actions
        .press_hotkey(&[Key::ControlLeft, Key::KeyN])
        .await?;
    s.pace(Duration::from_millis(1500)).await;
    s.navigate(&s.targets.mail_url).await?;
    s.pace(Duration::from_secs(1)).await;

    let region = s.wait_for_browser().await?.search_region()?;
    let newest = wait_for_new_mail(s, region).await?;
    s.click_match(&newest).await?;
    s.pace(Duration::from_secs(1)).await;

    let code = extract_code(s, region).await?;
    tidy_mailbox(s, region).await;
    s.actions
        .press_hotkey(&[Key::ControlLeft, Key::KeyW])
        .await?;
    s.emit(
        LogLevel::Info,
        format!("verification code received ({} characters)", code.len()),
    );
    Ok(code)
}

/// Poll the inbox, hitting refresh each round, until an unread message row
/// shows up.
async fn wait_for_new_mail(
    s: &Session,
    region: Region,
) -> Result<crate::template::Match, AutomationError> {
    let spec = StepSpec::new("wait-for-new-mail", 25, Duration::from_secs(1));
    s.steps
        .run(&spec, |_| async move {
            if let Some(refresh) = s.find_any(&s.assets.receive_mail_button(), &region)? {
                s.click_match(&refresh).await?;
            }
            Ok(s.find_any(&s.assets.new_mail_row(), &region)?)
        })
        .await
}

/// Select and copy the text between the two anchors. Retried as a whole:
/// the message body may still be rendering on the first pass.
async fn extract_code(s: &Session, region: Region) -> Result<String, AutomationError> {
    let spec = StepSpec::new("extract-code", 3, Duration::from_secs(2));
    s.steps
        .run(&spec, |_| async move {
            s.highlight_text(CODE_START_ANCHOR).await?;
            let Some(start) = s.find_any(&s.assets.code_start_marker(), &region)? else {
                return Ok(None);
            };
            s.highlight_text(CODE_END_ANCHOR).await?;
            let Some(end) = s.find_any(&s.assets.code_end_marker(), &region)? else {
                return Ok(None);
            };

            s.actions
                .drag_select(
                    start.x + DRAG_START_OFFSET.0,
                    start.y + DRAG_START_OFFSET.1,
                    end.x + DRAG_END_OFFSET.0,
                    end.y + DRAG_END_OFFSET.1,
                    Duration::from_millis(400),
                )
                .await?;
            let text = s.actions.copy_selection().await?;
            Ok(extract_between(&text, CODE_START_ANCHOR, CODE_END_ANCHOR).map(str::to_string))
        })
        .await
}

/// Best-effort cleanup so the consumed message does not match as "new" on
/// the next run.
async fn tidy_mailbox(s: &Session, region: Region) {
    match s.find_any(&s.assets.mark_all_read_button(), &region) {
        Ok(Some(hit)) => {
            if let Err(e) = s.click_match(&hit).await {
                s.emit(LogLevel::Warn, format!("mark-all-read click failed: {e}"));
            }
        }
        Ok(None) => {}
        Err(e) => s.emit(LogLevel::Warn, format!("mark-all-read probe failed: {e}")),
    }
}

/// The trimmed text strictly between the first `start` and the following
/// `end`, or `None` when either anchor is absent or nothing lies between.
fn extract_between<'a>(text: &'a str, start: &str, end: &str) -> Option<&'a str> {
    let after = text.find(start)? + start.len();
    let rest = &text[after..];
    let code = rest[..rest.find(end)?].trim();
    (!code.is_empty()).then_some(code)
}
