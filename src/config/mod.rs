use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::grammar::GrammarBuilder;

const DEFAULT_CONFIG: &str = "treeburg.yml";

/// Settings from `treeburg.yml`. Every key is optional and unknown keys are
/// ignored.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    /// Overrides the grammar's `%start`.
    pub start: Option<String>,
    pub deny_warnings: bool,
    pub format: Option<String>,
    /// Terminal numbers, usually the host IR's opcode numbering.
    pub terms: BTreeMap<String, u32>,
    /// Constant costs standing in for dynamic cost functions when trees are
    /// labeled from the command line.
    pub costs: BTreeMap<String, u32>,
    #[serde(skip)]
    source: Option<PathBuf>,
}

impl TableConfig {
    /// Where the config was read from, if a file was found.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Apply terminal numbers and the start override to a parsed grammar.
    /// Numbers for names the grammar never declares are skipped.
    pub fn apply(&self, builder: &mut GrammarBuilder) {
        for (name, &number) in &self.terms {
            if builder.is_term(name) {
                builder.declare_term(name, Some(number), None);
            } else {
                log::warn!("config numbers unknown terminal {name}");
            }
        }
        if let Some(start) = &self.start {
            builder.start(start, None);
        }
    }
}

/// Load config from the given path, or look for `treeburg.yml` in the
/// current directory. Returns the default config if that file doesn't exist;
/// an explicit path must exist.
pub fn load_config(path: Option<&Path>) -> Result<TableConfig> {
    let config_path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let p = Path::new(DEFAULT_CONFIG).to_path_buf();
            if !p.exists() {
                return Ok(TableConfig::default());
            }
            p
        }
    };

    let contents = std::fs::read_to_string(&config_path)
        .with_context(|| format!("failed to read config {}", config_path.display()))?;
    // An empty file parses as null.
    let mut config: TableConfig = if contents.trim().is_empty() {
        TableConfig::default()
    } else {
        serde_yml::from_str(&contents)
            .with_context(|| format!("failed to parse {}", config_path.display()))?
    };
    config.source = Some(config_path);
    Ok(config)
}
