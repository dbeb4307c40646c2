//! Mount configuration.
//!
//! Either a TOML file:
//!
//! ```toml
//! [[roots]]
//! name = "docs"
//! path = "/srv/docs"
//! trash = "/srv/.trash/docs"
//!
//! [[roots]]
//! name = "archive"
//! path = "/srv/archive"
//! read_only = true
//! ```
//!
//! or environment variables: `DOCVFS_CONFIG` naming such a file, otherwise
//! `DOCVFS_ROOTS=name=path[:name=path...]`, `DOCVFS_TRASH_HOME` (each root
//! gets `<home>/<name>` as its trash) and `DOCVFS_READ_ONLY=name[,name...]`.

use crate::errors::CoreError;
use crate::path;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

pub type EnvVarMap = HashMap<String, String>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub roots: Vec<RootConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RootConfig {
    pub name: String,
    pub path: PathBuf,
    #[serde(default)]
    pub trash: Option<PathBuf>,
    #[serde(default)]
    pub read_only: bool,
}

impl StorageConfig {
    pub fn parse(text: &str) -> crate::Result<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|err| CoreError::invalid_input(format!("bad storage config: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> crate::Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|err| CoreError::io(path, err))?;
        Self::parse(&text)
    }

    /// Reads the process environment.
    pub fn from_env() -> crate::Result<Self> {
        Self::from_environ(&std::env::vars().collect())
    }

    pub fn from_environ(environ: &EnvVarMap) -> crate::Result<Self> {
        if let Some(file) = environ.get("DOCVFS_CONFIG").filter(|v| !v.is_empty()) {
            return Self::load(Path::new(file));
        }

        let trash_home = environ
            .get("DOCVFS_TRASH_HOME")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        let read_only: HashSet<&str> = environ
            .get("DOCVFS_READ_ONLY")
            .map(|v| v.split(',').map(str::trim).filter(|n| !n.is_empty()).collect())
            .unwrap_or_default();

        let mut roots = Vec::new();
        if let Some(spec) = environ.get("DOCVFS_ROOTS") {
            for item in spec.split(':').filter(|item| !item.is_empty()) {
                let (name, root_path) = item.split_once('=').ok_or_else(|| {
                    CoreError::invalid_input(format!("DOCVFS_ROOTS entry {item:?} is not name=path"))
                })?;
                roots.push(RootConfig {
                    name: name.to_string(),
                    path: PathBuf::from(root_path),
                    trash: trash_home.as_ref().map(|home| home.join(name)),
                    read_only: read_only.contains(name),
                });
            }
        }

        let config = Self { roots };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> crate::Result<()> {
        let mut seen = HashSet::new();
        for root in &self.roots {
            path::check_name(&root.name)
                .map_err(|err| CoreError::invalid_input(format!("root name {:?}: {err}", root.name)))?;
            if !seen.insert(root.name.as_str()) {
                return Err(CoreError::invalid_input(format!(
                    "root {:?} configured twice",
                    root.name
                )));
            }
            if let Some(trash) = &root.trash {
                if trash.starts_with(&root.path) {
                    return Err(CoreError::invalid_input(format!(
                        "root {:?}: trash must live outside the root",
                        root.name
                    )));
                }
            }
        }
        Ok(())
    }
}
