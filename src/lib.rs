//! Crate entry point for **fcup**, the FreeCAD weekly build updater.
//!
//! This library keeps a local FreeCAD installation in step with the newest
//! weekly build published on GitHub. Each submodule encapsulates one
//! responsibility (release feed, download cache, extraction, merge, version
//! probe), and [`upgrade::UpdatePipeline`] sequences them.
//! The `pub use` re-exports make the CLI commands accessible from the crate root.

pub mod config;
pub mod error;
pub mod paths;
pub mod probe;
mod process;
pub mod progress;
pub mod prompt;
pub mod sync;
pub mod upgrade;

/// Re-export commonly used types and commands so they can be accessed from `fcup::*`.
pub use config::{Settings, StateStore, cmd_set_dir};
pub use error::UpdateError;
pub use paths::fcup_home;
pub use probe::{InstalledVersion, cmd_detect, parse_version_output, probe_installed};
pub use sync::merge;
pub use upgrade::{PipelineState, UpdatePipeline, cmd_check};
