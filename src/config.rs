//! Engine configuration.
//!
//! Every option has a default, so an empty TOML document is a valid
//! configuration. Loader settings describe what to build; the engine turns
//! them into [`ResourceLoader`](crate::cache::ResourceLoader)s.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::diagnostics::TemplateError;
use crate::err_msg;

/// Whitespace trimming around directive lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpaceGobbling {
    /// Output exactly what the template says.
    None,
    /// Remove the indentation and line terminator of lines holding only a directive.
    #[default]
    Lines,
    /// `Lines`, plus de-indent the bodies of gobbled block directives.
    Structured,
}

/// One entry of the loader chain, tried in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LoaderConfig {
    File {
        #[serde(default = "default_paths")]
        paths: Vec<PathBuf>,
    },
    String {
        #[serde(default)]
        templates: BTreeMap<String, String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub space_gobbling: SpaceGobbling,
    /// Unresolved references and missing members become render errors.
    pub strict_references: bool,
    pub macro_max_depth: usize,
    /// Most templates on the `#parse` stack at once, the outermost included.
    pub parse_max_depth: usize,
    /// Upper bound on iterations of a single `#foreach`; unbounded when unset.
    pub foreach_max_loops: Option<usize>,
    /// Largest range literal built as a list. A `#foreach` over a range
    /// literal iterates lazily and is bounded by `foreach_max_loops` instead.
    pub range_max_size: usize,
    /// Seconds between modification checks of a cached template; 0 disables them.
    pub modification_check_interval: u64,
    /// Templates whose macros are visible to every render, lowest priority first.
    pub macro_libraries: Vec<String>,
    pub loaders: Vec<LoaderConfig>,
    pub intern_names: bool,
    pub input_encoding: String,
}

fn default_paths() -> Vec<PathBuf> {
    vec![PathBuf::from(".")]
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            space_gobbling: SpaceGobbling::Lines,
            strict_references: false,
            macro_max_depth: 20,
            parse_max_depth: 10,
            foreach_max_loops: None,
            range_max_size: 1_000_000,
            modification_check_interval: 2,
            macro_libraries: Vec::new(),
            loaders: Vec::new(),
            intern_names: true,
            input_encoding: "UTF-8".into(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, TemplateError> {
        let config: EngineConfig =
            toml::from_str(text).map_err(|e| err_msg!(Config, "invalid configuration: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, TemplateError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| err_msg!(Config, "cannot read {}: {}", path.display(), e))?;
        Self::from_toml_str(&text)
    }

    /// Rejects settings the engine cannot honour.
    pub fn validate(&self) -> Result<(), TemplateError> {
        let encoding = self.input_encoding.to_ascii_lowercase().replace('_', "-");
        if encoding != "utf-8" && encoding != "utf8" {
            return Err(err_msg!(
                Config,
                "unsupported input encoding '{}': only UTF-8 is accepted",
                self.input_encoding
            ));
        }
        if self.macro_max_depth == 0 {
            return Err(err_msg!(Config, "macro_max_depth must be at least 1"));
        }
        if self.parse_max_depth == 0 {
            return Err(err_msg!(Config, "parse_max_depth must be at least 1"));
        }
        if self.range_max_size == 0 {
            return Err(err_msg!(Config, "range_max_size must be at least 1"));
        }
        Ok(())
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.modification_check_interval)
    }

    pub fn with_gobbling(mut self, gobbling: SpaceGobbling) -> Self {
        self.space_gobbling = gobbling;
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict_references = strict;
        self
    }
}
