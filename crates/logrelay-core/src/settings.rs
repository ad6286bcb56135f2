//! Settings supplied by configuration and read by the task layer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which runtime the caller would like the external tool to run under.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimePreference {
    /// Let runtime resolution pick.
    #[default]
    Auto,
    /// Run the managed package through a managed-runtime launcher.
    #[serde(alias = "dotnet")]
    Managed,
    /// Run the native executable through a compatibility layer.
    #[serde(alias = "wine")]
    Compat,
}

impl fmt::Display for RuntimePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Managed => write!(f, "managed"),
            Self::Compat => write!(f, "compat"),
        }
    }
}

/// Settings for the external analysis tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExternalToolSettings {
    /// Whether the tool runs at all.
    pub enabled: bool,
    /// Install the tool on first use when it is missing.
    pub auto_setup: bool,
    /// Check the release descriptor for newer versions.
    pub auto_update: bool,
    /// Preferred runtime variant.
    pub preferred_runtime: RuntimePreference,
}

impl Default for ExternalToolSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            auto_setup: true,
            auto_update: true,
            preferred_runtime: RuntimePreference::Auto,
        }
    }
}

impl ExternalToolSettings {
    /// Builder method to enable the tool.
    pub fn enabled(mut self) -> Self {
        self.enabled = true;
        self
    }

    /// Builder method to set the preferred runtime.
    pub fn with_preferred_runtime(mut self, preference: RuntimePreference) -> Self {
        self.preferred_runtime = preference;
        self
    }
}
