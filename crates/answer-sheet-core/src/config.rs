//! Client configuration
//!
//! The page passes a JSON object when the app starts; TOML is accepted too
//! for static deployments. Every key is optional.

use anyhow::Context;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Prefix for every backend endpoint (default: same origin)
    #[serde(default)]
    pub api_base: String,
    /// Prefix for page images (default: `/uploads/`)
    #[serde(default = "default_uploads_prefix")]
    pub uploads_prefix: String,
    /// Classes offered in legacy mode when neither the test nor the site
    /// list provides any
    #[serde(default = "default_fallback_classes")]
    pub fallback_classes: Vec<String>,
    /// Delay before re-measuring the page after a rotation (default: 800)
    #[serde(default = "default_orientation_settle_ms")]
    pub orientation_settle_ms: u32,
    /// Re-focus an already answered field after a page renders (default: true)
    #[serde(default = "default_autofocus_filled")]
    pub autofocus_filled: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: String::new(),
            uploads_prefix: default_uploads_prefix(),
            fallback_classes: default_fallback_classes(),
            orientation_settle_ms: default_orientation_settle_ms(),
            autofocus_filled: default_autofocus_filled(),
        }
    }
}

impl ClientConfig {
    /// Parse configuration from a JSON string
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or a key has the wrong type
    pub fn from_json_str(s: &str) -> anyhow::Result<Self> {
        serde_json::from_str(s).context("Failed to parse JSON configuration")
    }

    /// Parse configuration from a TOML string
    ///
    /// # Example
    ///
    /// ```
    /// use answer_sheet_core::config::ClientConfig;
    ///
    /// # fn example() -> anyhow::Result<()> {
    /// let config = ClientConfig::from_toml_str(r#"
    ///     api_base = "https://tests.example"
    ///     orientation_settle_ms = 500
    /// "#)?;
    /// assert_eq!(config.uploads_prefix, "/uploads/");
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        toml::from_str(s).context("Failed to parse TOML configuration")
    }
}

fn default_uploads_prefix() -> String {
    "/uploads/".to_string()
}

fn default_fallback_classes() -> Vec<String> {
    ["5А", "5Б", "6А", "6Б", "7А", "7Б", "8А", "8Б", "9А", "9Б", "10А", "10Б", "11А", "11Б"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_orientation_settle_ms() -> u32 {
    800
}

fn default_autofocus_filled() -> bool {
    true
}
