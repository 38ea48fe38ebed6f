//! Configuration schema definitions.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use trellis_router::RouterConfig;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TrellisConfig {
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Router and command-resolution settings.
    #[serde(default)]
    pub router: RouterSection,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Base log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Output destination.
    #[serde(default)]
    pub output: LogOutput,

    /// Log file path, used when `output = "file"`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    /// Per-module level overrides, e.g. `trellis_router = "debug"`.
    #[serde(default)]
    pub filters: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            output: LogOutput::default(),
            file_path: None,
            filters: HashMap::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Log output format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Compact single-line output.
    #[default]
    Compact,
    /// Default `tracing` formatting.
    Full,
    /// Multi-line human-oriented output.
    Pretty,
}

/// Log output destination.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    /// Standard output.
    #[default]
    Stdout,
    /// Standard error.
    Stderr,
    /// A log file; requires `file_path`.
    File,
}

/// Router configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterSection {
    /// Nicknames that address the endpoint.
    #[serde(default)]
    pub nicknames: Vec<String>,

    /// Command prefixes, tried in order.
    #[serde(default)]
    pub prefixes: Vec<String>,

    /// Minimum normalized similarity for fuzzy suggestions.
    #[serde(default = "default_similarity")]
    pub similarity: f64,

    /// At-mention pattern; `{self}` expands to the endpoint id.
    #[serde(default = "default_mention_template")]
    pub mention_template: String,

    /// Suggestion prompt; `{command}` and `{accept}` expand.
    #[serde(default = "default_suggest_prompt")]
    pub suggest_prompt: String,

    /// Reply that accepts a pending suggestion.
    #[serde(default = "default_accept_word")]
    pub accept_word: String,
}

impl Default for RouterSection {
    fn default() -> Self {
        Self {
            nicknames: Vec::new(),
            prefixes: Vec::new(),
            similarity: default_similarity(),
            mention_template: default_mention_template(),
            suggest_prompt: default_suggest_prompt(),
            accept_word: default_accept_word(),
        }
    }
}

impl RouterSection {
    /// Converts to the router's own configuration type.
    pub fn to_router_config(&self) -> RouterConfig {
        RouterConfig {
            nicknames: self.nicknames.clone(),
            prefixes: self.prefixes.clone(),
            similarity: self.similarity,
            mention_template: self.mention_template.clone(),
            suggest_prompt: self.suggest_prompt.clone(),
            accept_word: self.accept_word.clone(),
        }
    }
}

fn default_similarity() -> f64 {
    RouterConfig::default().similarity
}

fn default_mention_template() -> String {
    RouterConfig::default().mention_template
}

fn default_suggest_prompt() -> String {
    RouterConfig::default().suggest_prompt
}

fn default_accept_word() -> String {
    RouterConfig::default().accept_word
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_defaults_mirror_router_defaults() {
        let section = RouterSection::default();
        let config = section.to_router_config();
        let native = RouterConfig::default();
        assert_eq!(config.similarity, native.similarity);
        assert_eq!(config.mention_template, native.mention_template);
        assert_eq!(config.accept_word, native.accept_word);
    }
}
