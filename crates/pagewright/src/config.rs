//! Engine configuration.
//!
//! [`TemplateConfig`] holds the plain settings of a
//! [`TemplateContext`](crate::TemplateContext). Everything that is code
//! (formats, filters, transformers, services) is registered through builder
//! methods on the context instead.
//!
//! Configuration can be built in code or loaded from YAML. Missing keys
//! take their defaults:
//!
//! ```rust
//! use pagewright::TemplateConfig;
//!
//! let config = TemplateConfig::from_yaml(r#"
//! debug_mode: true
//! culture: en-GB
//! check_for_modified_pages_after_secs: 5
//! "#).unwrap();
//!
//! assert!(config.debug_mode);
//! assert_eq!(config.culture, "en-GB");
//! assert_eq!(config.default_layout_page, "_layout");
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::error::TemplateResult;

/// Settings shared by every render of a context.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TemplateConfig {
    /// Re-check page freshness on every access and render expression errors
    /// inline in HTML output.
    pub debug_mode: bool,

    /// Re-check page freshness on every access.
    pub check_for_modified_pages: bool,

    /// Minimum interval between freshness checks of a single page. When unset
    /// every access checks.
    pub check_for_modified_pages_after_secs: Option<u64>,

    /// Layout name used when a page does not declare one.
    pub default_layout_page: String,

    /// Page name served for directory paths.
    pub index_page: String,

    /// Virtual directory holding one-time pages.
    pub temp_dir: String,

    /// Culture used by culture-sensitive filters such as `currency`.
    pub culture: String,

    /// Maximum nesting of partials before a render fails.
    pub max_partial_depth: usize,

    /// Maximum nesting of expression values evaluated from other values.
    pub max_nested_evaluation_depth: usize,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            debug_mode: false,
            check_for_modified_pages: false,
            check_for_modified_pages_after_secs: None,
            default_layout_page: "_layout".to_string(),
            index_page: "index".to_string(),
            temp_dir: "__tmp".to_string(),
            culture: "en-US".to_string(),
            max_partial_depth: 50,
            max_nested_evaluation_depth: 32,
        }
    }
}

impl TemplateConfig {
    /// Parses configuration from YAML.
    pub fn from_yaml(yaml: &str) -> TemplateResult<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Returns `true` if loaded pages must be checked for changes.
    pub fn checks_freshness(&self) -> bool {
        self.debug_mode || self.check_for_modified_pages
    }

    /// The throttle interval for freshness checks, if any.
    pub fn check_interval(&self) -> Option<Duration> {
        self.check_for_modified_pages_after_secs
            .map(Duration::from_secs)
    }
}
