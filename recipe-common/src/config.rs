//! Configuration loading and root folder resolution
//!
//! Root folder priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`RECIPE_ROOT_FOLDER`, then `RECIPE_ROOT`)
//! 3. Bootstrap TOML file (`root_folder` key)
//! 4. OS-dependent compiled default (fallback)
//!
//! Two TOML files exist. The bootstrap file lives in the user config
//! directory (`~/.config/recipe-extract/<module>.toml`) and is read only
//! for `root_folder`, since the root folder cannot be found from inside
//! itself. Every other setting lives in `<root>/<module>.toml`.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Primary root folder environment variable
pub const ROOT_FOLDER_ENV: &str = "RECIPE_ROOT_FOLDER";

/// Alternative root folder environment variable
pub const ROOT_ENV: &str = "RECIPE_ROOT";

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "recipes.db";

/// Directory (inside the root folder) holding per-job scratch directories
pub const JOBS_DIR_NAME: &str = "jobs";

/// Compiled defaults for the current platform
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub log_level: String,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        let root_folder = if cfg!(target_os = "linux") {
            // ~/.local/share/recipe-extract (or /var/lib for system-wide)
            dirs::data_local_dir()
                .map(|d| d.join("recipe-extract"))
                .unwrap_or_else(|| PathBuf::from("/var/lib/recipe-extract"))
        } else if cfg!(target_os = "macos") {
            dirs::data_dir()
                .map(|d| d.join("recipe-extract"))
                .unwrap_or_else(|| PathBuf::from("/Library/Application Support/recipe-extract"))
        } else if cfg!(target_os = "windows") {
            dirs::data_local_dir()
                .map(|d| d.join("recipe-extract"))
                .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\recipe-extract"))
        } else {
            PathBuf::from("./recipe_data")
        };

        Self {
            root_folder,
            log_level: "info".to_string(),
        }
    }
}

/// Logging section of a module TOML file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// tracing EnvFilter directive (e.g. "info", "recipe_extract=debug")
    pub level: Option<String>,
}

/// Resolves the root folder for a module
#[derive(Debug, Clone)]
pub struct RootFolderResolver {
    module_name: String,
    cli_arg: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(module_name: impl Into<String>) -> Self {
        Self {
            module_name: module_name.into(),
            cli_arg: None,
        }
    }

    /// Command-line override (highest priority)
    pub fn with_cli_arg(mut self, cli_arg: Option<PathBuf>) -> Self {
        self.cli_arg = cli_arg;
        self
    }

    /// Resolve the root folder. Never fails: missing sources fall through to defaults.
    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            info!("Root folder from command line: {}", path.display());
            return path.clone();
        }

        for var in [ROOT_FOLDER_ENV, ROOT_ENV] {
            if let Ok(path) = std::env::var(var) {
                if !path.trim().is_empty() {
                    info!("Root folder from {}: {}", var, path);
                    return PathBuf::from(path);
                }
            }
        }

        if let Some(path) = self.root_folder_from_toml() {
            info!("Root folder from TOML config: {}", path.display());
            return path;
        }

        let defaults = CompiledDefaults::for_current_platform();
        info!("Root folder from compiled default: {}", defaults.root_folder.display());
        defaults.root_folder
    }

    /// Bootstrap file in the user config directory; only `root_folder` is read
    pub fn bootstrap_config_path(&self) -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("recipe-extract").join(format!("{}.toml", self.module_name)))
    }

    fn root_folder_from_toml(&self) -> Option<PathBuf> {
        let path = self.bootstrap_config_path()?;
        let content = std::fs::read_to_string(&path).ok()?;
        match toml::from_str::<toml::Value>(&content) {
            Ok(value) => value
                .get("root_folder")
                .and_then(|v| v.as_str())
                .map(PathBuf::from),
            Err(e) => {
                warn!("Ignoring unparseable config file {}: {}", path.display(), e);
                None
            }
        }
    }
}

/// Creates the root folder layout on startup
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }

    /// Create the root folder if missing (idempotent)
    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root_folder.exists() {
            info!("Creating root folder: {}", self.root_folder.display());
        }
        std::fs::create_dir_all(&self.root_folder)?;
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE_NAME)
    }

    pub fn database_exists(&self) -> bool {
        self.database_path().exists()
    }

    /// Parent directory for job-scoped scratch directories
    pub fn jobs_path(&self) -> PathBuf {
        self.root_folder.join(JOBS_DIR_NAME)
    }

    /// Module settings TOML stored alongside the database
    pub fn module_config_path(&self, module_name: &str) -> PathBuf {
        self.root_folder.join(format!("{}.toml", module_name))
    }
}

/// Load a TOML file into `T`
///
/// A missing file is not an error: defaults are returned and a debug line is logged.
/// A present but malformed file is a `Config` error.
pub fn load_toml_config<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        debug!("Config file not found, using defaults: {}", path.display());
        return Ok(T::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;

    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}
