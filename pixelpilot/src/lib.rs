//! Pixel-driven desktop automation for account maintenance.
//!
//! The engine perceives the screen exclusively through template matching
//! over captured pixels and acts exclusively through synthetic mouse,
//! keyboard and clipboard input. There is no accessibility tree, no DOM and
//! no OCR: a control exists when its authored reference image correlates
//! somewhere inside a search region.
//!
//! Layers, bottom up:
//! - [`geometry`], [`capture`], [`template`]: regions, frames and the
//!   normalized cross-correlation matcher.
//! - [`window`], [`process`], [`input`]: OS window targeting, process
//!   control and input synthesis.
//! - [`step`]: the retry/timeout envelope every perception-or-action step
//!   runs under, including cooperative cancellation.
//! - [`workflow`]: the user-facing procedures (sign-in, account deletion,
//!   identity reset) sequenced by the [`Orchestrator`].
//!
//! ```no_run
//! use pixelpilot::{EngineOptions, Orchestrator, Procedure, SettlePolicy, Targets};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), pixelpilot::AutomationError> {
//!     let orchestrator = Orchestrator::with_system_backends(EngineOptions {
//!         asset_root: "resources/images".into(),
//!         config_path: "config/settings.json".into(),
//!         storage_path: "storage.json".into(),
//!         backup_dir: "backups".into(),
//!         updater_path: None,
//!         settle: SettlePolicy::default(),
//!         targets: Targets::default(),
//!     })?;
//!     let outcome = orchestrator.run(Procedure::SignIn).await;
//!     println!("{outcome:?}");
//!     Ok(())
//! }
//! ```

pub mod assets;
pub mod capture;
pub mod config;
pub mod errors;
pub mod geometry;
pub mod input;
pub mod process;
pub mod reset;
pub mod step;
pub mod template;
pub mod window;
pub mod workflow;

pub use assets::AssetCatalog;
pub use capture::{save_region_snapshot, Frame, ScreenSource, XcapScreen};
pub use config::{ConfigStore, Settings};
pub use errors::AutomationError;
pub use geometry::Region;
pub use input::{ActionPrimitives, InputBackend, Key, SettlePolicy, SystemInput};
pub use reset::{IdentityReset, IdentitySet};
pub use step::{CancellationToken, StepExecutor, StepSpec};
pub use template::{Match, TemplateMatcher, TemplateRef};
pub use window::{WindowHandle, WindowLocator};
pub use workflow::{
    EngineOptions, LogLevel, LogSink, Orchestrator, Procedure, Targets, WorkflowOutcome,
};
