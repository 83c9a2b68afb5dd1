//! Configuration file handling for redgrant.
//!
//! Looks for `.config/redgrant.styx` in the current directory or any parent directory.

pub use redgrant_config::Config;

use std::path::{Path, PathBuf};

/// Environment variable consulted when no database URL is configured.
pub const DATABASE_URL_ENV: &str = "REDGRANT_DATABASE_URL";

/// A loaded configuration and where it was found.
pub struct Loaded {
    pub config: Config,
    pub path: PathBuf,
}

impl Loaded {
    /// Directory containing `.config`.
    pub fn root(&self) -> &Path {
        self.path
            .parent()
            .and_then(Path::parent)
            .unwrap_or_else(|| Path::new("."))
    }

    /// Path of the state file.
    pub fn state_path(&self) -> PathBuf {
        let file = self
            .config
            .state_file
            .as_deref()
            .unwrap_or(redgrant_config::DEFAULT_STATE_FILE);
        self.root().join(file)
    }

    /// Connection URL: command line first, then the config file, then the environment.
    pub fn database_url(&self, from_cli: Option<String>) -> Result<String, ConfigError> {
        from_cli
            .or_else(|| self.config.database.url.clone())
            .or_else(|| std::env::var(DATABASE_URL_ENV).ok())
            .ok_or(ConfigError::NoDatabaseUrl)
    }
}

/// Load configuration from `.config/redgrant.styx`, searching up the directory tree.
pub fn load() -> Result<Loaded, ConfigError> {
    let cwd = std::env::current_dir().map_err(|e| ConfigError::Io(e.to_string()))?;
    load_from(&cwd)
}

/// Load configuration starting from a specific directory.
pub fn load_from(start: &Path) -> Result<Loaded, ConfigError> {
    let path = find_config_file(start)?;
    let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io(e.to_string()))?;

    let config: Config =
        facet_styx::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;

    Ok(Loaded { config, path })
}

/// Find `.config/redgrant.styx` by searching up the directory tree.
fn find_config_file(start: &Path) -> Result<PathBuf, ConfigError> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(".config/redgrant.styx");
        if config_path.exists() {
            return Ok(config_path);
        }

        if !current.pop() {
            return Err(ConfigError::NotFound);
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// No `.config/redgrant.styx` found in any parent directory
    NotFound,
    /// I/O error reading the file
    Io(String),
    /// Parse error in the Styx file
    Parse(String),
    /// Neither `--database-url`, `database.url` nor the environment gave a URL
    NoDatabaseUrl,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::NotFound => {
                write!(
                    f,
                    "No .config/redgrant.styx found in current directory or any parent"
                )
            }
            ConfigError::Io(e) => write!(f, "Failed to read .config/redgrant.styx: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse .config/redgrant.styx: {}", e),
            ConfigError::NoDatabaseUrl => write!(
                f,
                "No database URL: pass --database-url, set database.url, or set {}",
                DATABASE_URL_ENV
            ),
        }
    }
}

impl std::error::Error for ConfigError {}
