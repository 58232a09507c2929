//! Synthetic mouse/keyboard/clipboard primitives.
//!
//! The physical input device and the OS clipboard are process-wide
//! singletons with no native locking, so these operations are not safe to
//! call concurrently; the orchestrator guarantees strictly sequential
//! invocation from a single worker task.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rdev::{simulate, EventType, SimulateError};
use tokio::time::sleep;
use tracing::{debug, instrument};

use crate::errors::AutomationError;

pub use rdev::{Button, Key};

/// The one settle-delay policy consumed by every primitive.
///
/// There is no completion signal from the target application, so each
/// dispatched input is followed by `after_action`; `between_events` paces
/// the low-level events inside one primitive (press/release, move steps).
/// Centralised here so timing assumptions are tunable in one place.
#[derive(Debug, Clone, Copy)]
pub struct SettlePolicy {
    pub after_action: Duration,
    pub between_events: Duration,
}

impl Default for SettlePolicy {
    fn default() -> Self {
        Self {
            after_action: Duration::from_millis(300),
            between_events: Duration::from_millis(50),
        }
    }
}

/// Low-level event sink. The production implementation dispatches through
/// `rdev`/`arboard`; tests substitute a recording fake.
pub trait InputBackend: Send + Sync {
    fn mouse_move(&self, x: f64, y: f64) -> Result<(), AutomationError>;
    fn button_press(&self, button: Button) -> Result<(), AutomationError>;
    fn button_release(&self, button: Button) -> Result<(), AutomationError>;
    fn key_press(&self, key: Key) -> Result<(), AutomationError>;
    fn key_release(&self, key: Key) -> Result<(), AutomationError>;
    fn set_clipboard(&self, text: &str) -> Result<(), AutomationError>;
    fn get_clipboard(&self) -> Result<String, AutomationError>;
}

fn dispatch(event: &EventType) -> Result<(), AutomationError> {
    simulate(event).map_err(|SimulateError| {
        AutomationError::InputError(format!("failed to dispatch {event:?}"))
    })
}

/// Dispatches through the OS input queue and clipboard.
pub struct SystemInput {
    clipboard: Mutex<arboard::Clipboard>,
}

impl SystemInput {
    pub fn new() -> Result<Self, AutomationError> {
        let clipboard = arboard::Clipboard::new()
            .map_err(|e| AutomationError::InputError(format!("clipboard unavailable: {e}")))?;
        Ok(Self {
            clipboard: Mutex::new(clipboard),
        })
    }
}

impl InputBackend for SystemInput {
    fn mouse_move(&self, x: f64, y: f64) -> Result<(), AutomationError> {
        dispatch(&EventType::MouseMove { x, y })
    }

    fn button_press(&self, button: Button) -> Result<(), AutomationError> {
        dispatch(&EventType::ButtonPress(button))
    }

    fn button_release(&self, button: Button) -> Result<(), AutomationError> {
        dispatch(&EventType::ButtonRelease(button))
    }

    fn key_press(&self, key: Key) -> Result<(), AutomationError> {
        dispatch(&EventType::KeyPress(key))
    }

    fn key_release(&self, key: Key) -> Result<(), AutomationError> {
        dispatch(&EventType::KeyRelease(key))
    }

    fn set_clipboard(&self, text: &str) -> Result<(), AutomationError> {
        let mut clipboard = self
            .clipboard
            .lock()
            .map_err(|_| AutomationError::InputError("clipboard lock poisoned".to_string()))?;
        clipboard
            .set_text(text.to_string())
            .map_err(|e| AutomationError::InputError(format!("clipboard write failed: {e}")))
    }

    fn get_clipboard(&self) -> Result<String, AutomationError> {
        let mut clipboard = self
            .clipboard
            .lock()
            .map_err(|_| AutomationError::InputError("clipboard lock poisoned".to_string()))?;
        clipboard
            .get_text()
            .map_err(|e| AutomationError::InputError(format!("clipboard read failed: {e}")))
    }
}

/// High-level serialized input operations.
#[derive(Clone)]
pub struct ActionPrimitives {
    backend: Arc<dyn InputBackend>,
    settle: SettlePolicy,
}

impl ActionPrimitives {
    pub fn new(backend: Arc<dyn InputBackend>, settle: SettlePolicy) -> Self {
        Self { backend, settle }
    }

    async fn settled(&self) {
        sleep(self.settle.after_action).await;
    }

    async fn gap(&self) {
        sleep(self.settle.between_events).await;
    }

    /// Move the pointer to `(x, y)`. The OS does not report the current
    /// pointer position, so the move is absolute; `duration` paces hover
    /// time at the target before the settle delay.
    pub async fn move_to(&self, x: i32, y: i32, duration: Duration) -> Result<(), AutomationError> {
        self.backend.mouse_move(x as f64, y as f64)?;
        if !duration.is_zero() {
            sleep(duration).await;
        }
        self.settled().await;
        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn click(&self, x: i32, y: i32) -> Result<(), AutomationError> {
        self.backend.mouse_move(x as f64, y as f64)?;
        self.gap().await;
        self.backend.button_press(Button::Left)?;
        self.gap().await;
        self.backend.button_release(Button::Left)?;
        self.settled().await;
        Ok(())
    }

    /// Press-drag-release from `(x1, y1)` to `(x2, y2)`, selecting whatever
    /// lies between.
    #[instrument(level = "debug", skip(self))]
    pub async fn drag_select(
        &self,
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
        duration: Duration,
    ) -> Result<(), AutomationError> {
        self.backend.mouse_move(x1 as f64, y1 as f64)?;
        self.gap().await;
        self.backend.button_press(Button::Left)?;
        self.gap().await;
        const STEPS: i32 = 12;
        for step in 1..=STEPS {
            let t = step as f64 / STEPS as f64;
            let x = x1 as f64 + (x2 - x1) as f64 * t;
            let y = y1 as f64 + (y2 - y1) as f64 * t;
            self.backend.mouse_move(x, y)?;
            sleep(duration / STEPS as u32).await;
        }
        self.backend.button_release(Button::Left)?;
        self.settled().await;
        Ok(())
    }

    /// Paste `text` into the focused control via the clipboard.
    ///
    /// Text entry always goes through clipboard-paste rather than simulated
    /// keystrokes, sidestepping input-method-editor interference with
    /// non-ASCII and locale keyboard state.
    #[instrument(level = "debug", skip(self, text))]
    pub async fn paste_text(&self, text: &str) -> Result<(), AutomationError> {
        self.backend.set_clipboard(text)?;
        self.gap().await;
        self.press_hotkey(&[Key::ControlLeft, Key::KeyV]).await?;
        Ok(())
    }

    /// Press `keys` in order, release them in reverse.
    pub async fn press_hotkey(&self, keys: &[Key]) -> Result<(), AutomationError> {
        debug!(?keys, "hotkey");
        for key in keys {
            self.backend.key_press(*key)?;
            self.gap().await;
        }
        for key in keys.iter().rev() {
            self.backend.key_release(*key)?;
            self.gap().await;
        }
        self.settled().await;
        Ok(())
    }

    /// Tap a single key.
    pub async fn press_key(&self, key: Key) -> Result<(), AutomationError> {
        self.press_hotkey(&[key]).await
    }

    /// Copy the current selection and return the clipboard text.
    pub async fn copy_selection(&self) -> Result<String, AutomationError> {
        self.press_hotkey(&[Key::ControlLeft, Key::KeyC]).await?;
        self.backend.get_clipboard()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Records every backend call for assertion; clipboard is an in-memory
    /// string.
    #[derive(Default)]
    pub(crate) struct RecordingInput {
        pub events: Mutex<Vec<String>>,
        pub clipboard: Mutex<String>,
    }

    impl RecordingInput {
        pub(crate) fn log(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }

        fn record(&self, event: String) {
            self.events.lock().unwrap().push(event);
        }
    }

    impl InputBackend for RecordingInput {
        fn mouse_move(&self, x: f64, y: f64) -> Result<(), AutomationError> {
            self.record(format!("move {x:.0},{y:.0}"));
            Ok(())
        }

        fn button_press(&self, _button: Button) -> Result<(), AutomationError> {
            self.record("press".to_string());
            Ok(())
        }

        fn button_release(&self, _button: Button) -> Result<(), AutomationError> {
            self.record("release".to_string());
            Ok(())
        }

        fn key_press(&self, key: Key) -> Result<(), AutomationError> {
            self.record(format!("key+ {key:?}"));
            Ok(())
        }

        fn key_release(&self, key: Key) -> Result<(), AutomationError> {
            self.record(format!("key- {key:?}"));
            Ok(())
        }

        fn set_clipboard(&self, text: &str) -> Result<(), AutomationError> {
            *self.clipboard.lock().unwrap() = text.to_string();
            self.record("clip-set".to_string());
            Ok(())
        }

        fn get_clipboard(&self) -> Result<String, AutomationError> {
            self.record("clip-get".to_string());
            Ok(self.clipboard.lock().unwrap().clone())
        }
    }

    fn primitives(backend: Arc<RecordingInput>) -> ActionPrimitives {
        ActionPrimitives::new(backend, SettlePolicy::default())
    }

    #[tokio::test(start_paused = true)]
    async fn click_moves_then_presses_then_releases() {
        let backend = Arc::new(RecordingInput::default());
        let actions = primitives(backend.clone());
        actions.click(10, 20).await.unwrap();
        assert_eq!(backend.log(), vec!["move 10,20", "press", "release"]);
    }

    #[tokio::test(start_paused = true)]
    async fn paste_sets_clipboard_before_the_paste_chord() {
        let backend = Arc::new(RecordingInput::default());
        let actions = primitives(backend.clone());
        actions.paste_text("user@example.com").await.unwrap();
        let log = backend.log();
        assert_eq!(log[0], "clip-set");
        assert!(log.contains(&"key+ ControlLeft".to_string()));
        assert!(log.contains(&"key+ KeyV".to_string()));
        assert_eq!(*backend.clipboard.lock().unwrap(), "user@example.com");
    }

    #[tokio::test(start_paused = true)]
    async fn hotkey_releases_in_reverse_order() {
        let backend = Arc::new(RecordingInput::default());
        let actions = primitives(backend.clone());
        actions
            .press_hotkey(&[Key::ControlLeft, Key::KeyC])
            .await
            .unwrap();
        assert_eq!(
            backend.log(),
            vec![
                "key+ ControlLeft",
                "key+ KeyC",
                "key- KeyC",
                "key- ControlLeft"
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn drag_select_holds_the_button_across_the_motion() {
        let backend = Arc::new(RecordingInput::default());
        let actions = primitives(backend.clone());
        actions
            .drag_select(0, 0, 120, 40, Duration::from_millis(120))
            .await
            .unwrap();
        let log = backend.log();
        let press = log.iter().position(|e| e == "press").unwrap();
        let release = log.iter().position(|e| e == "release").unwrap();
        let last_move = log.iter().rposition(|e| e.starts_with("move")).unwrap();
        assert!(press < last_move && last_move < release);
        assert_eq!(log[last_move], "move 120,40");
    }
}
