use std::path::{Path, PathBuf};

use toml_edit::DocumentMut;
use tracing::debug;

use crate::error::Error;
use crate::rewrite::TraceCall;
use crate::syntax::ParseOptions;
use crate::toggle::ToggleOptions;

pub const CONFIG_FILE_NAME: &str = "lazytrace.toml";

/// Settings read from `lazytrace.toml`.
///
/// ```toml
/// [trace]
/// call = "console.debug"
///
/// [parse]
/// jsx = false
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub trace: TraceCall,
    /// Forces JSX on or off. `None` infers it from the file extension.
    pub jsx: Option<bool>,
}

impl Config {
    /// Parse config text. `path` is only used in error messages.
    pub fn parse(content: &str, path: &Path) -> Result<Self, Error> {
        let invalid = |reason: String| Error::InvalidConfig {
            path: path.to_path_buf(),
            reason,
        };
        let doc: DocumentMut = content
            .parse::<DocumentMut>()
            .map_err(|e| invalid(e.to_string()))?;

        let mut config = Config::default();

        if let Some(call) = doc.get("trace").and_then(|t| t.get("call")) {
            let call = call
                .as_str()
                .ok_or_else(|| invalid("trace.call must be a string".into()))?;
            config.trace = TraceCall::parse(call).ok_or_else(|| {
                invalid(format!("trace.call '{call}' is not a dotted identifier path"))
            })?;
        }

        if let Some(jsx) = doc.get("parse").and_then(|p| p.get("jsx")) {
            let jsx = jsx
                .as_bool()
                .ok_or_else(|| invalid("parse.jsx must be a boolean".into()))?;
            config.jsx = Some(jsx);
        }

        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path).map_err(|source| Error::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(&content, path)?;
        debug!(path = %path.display(), trace = %config.trace, jsx = ?config.jsx, "loaded config");
        Ok(config)
    }

    /// Load the nearest config file above `start_dir`, or defaults if there
    /// is none.
    pub fn discover(start_dir: &Path) -> Result<Self, Error> {
        match find_config_file(start_dir) {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    /// Toggle options for `file`, with this config applied.
    pub fn toggle_options(&self, file: &Path) -> ToggleOptions {
        let mut parse = ParseOptions::for_path(file);
        if let Some(jsx) = self.jsx {
            parse.jsx = jsx;
        }
        ToggleOptions {
            parse,
            trace: self.trace.clone(),
        }
    }
}

/// Find `lazytrace.toml` by walking up from `start_dir`.
///
/// Starts checking `start_dir` itself, then walks up through parents.
pub fn find_config_file(start_dir: &Path) -> Option<PathBuf> {
    let start = start_dir.canonicalize().ok()?;
    let mut dir = start.as_path();
    loop {
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            return Some(candidate);
        }
        dir = dir.parent()?;
    }
}
