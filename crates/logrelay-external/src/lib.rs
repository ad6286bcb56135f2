//! External analysis tool support for logrelay
//!
//! This crate installs, updates and runs the command-line analysis tool
//! as a subprocess, picking whichever runtime variant the host can offer.
//!
//! # Example
//!
//! ```rust,no_run
//! use logrelay_core::{ExternalToolRequest, ExternalToolSettings};
//! use logrelay_external::ExternalToolRunner;
//!
//! async fn analyze() {
//!     let runner = ExternalToolRunner::new("/var/lib/logrelay");
//!     let request = ExternalToolRequest::new(
//!         "/logs/20240101-120000.zevtc",
//!         ExternalToolSettings::default().enabled(),
//!     );
//!
//!     let result = runner.run(&request).await;
//!     println!("source: {:?}", result.source);
//! }
//! ```

mod config;
mod discover;
mod error;
mod executor;
mod install;
mod paths;
mod reader;
mod runtime;

pub use config::{build_config, CONFIG_FILE_NAME};
pub use discover::{pick_output_file, ToolBinaries, MAX_SCAN_DEPTH};
pub use error::ToolError;
pub use executor::{ExternalToolRunner, DEFAULT_UPDATE_INTERVAL};
pub use install::{Installer, ReleaseInfo, UpdateStatus, DEFAULT_ASSET_NAME, DEFAULT_RELEASE_URL};
pub use paths::{default_data_root, log_base_name, sanitize_key, ToolPaths};
pub use reader::{DocumentReader, InlineReader};
pub use runtime::{resolve_runtime, RuntimeEnvironment};
