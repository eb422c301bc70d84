//! Layered application configuration.
//!
//! Values are merged with figment, later layers winning:
//!
//! 1. Built-in defaults
//! 2. TOML file (`--config`, or `config.toml` in the platform config dir)
//! 3. `PHOTODUPE_*` environment variables
//! 4. Command-line flags
//!
//! ```toml
//! sensitivity = 0.95
//! mode = "move"
//! duplicates_folder = "/photos/_duplicates"
//! operation_log = "/photos/_duplicates/operations.csv"
//! ```

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::actions::ResolveConfig;
use crate::cli::DedupArgs;
use crate::duplicates::{FinderConfig, DEFAULT_SENSITIVITY, DEFAULT_VIDEO_COMPARE_LIMIT};
use crate::scanner::WalkerConfig;

/// Prefix of configuration environment variables.
pub const ENV_PREFIX: &str = "PHOTODUPE_";

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An explicitly given config file does not exist.
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// A layer could not be parsed or has the wrong shape.
    #[error("Invalid configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    /// Sensitivity outside `[0, 1]`.
    #[error("sensitivity must be between 0 and 1, got {0}")]
    InvalidSensitivity(f64),

    /// Worker count of zero.
    #[error("threads must be at least 1")]
    ZeroThreads,

    /// Video compare limit of zero.
    #[error("video_compare_limit must be at least 1")]
    ZeroCompareLimit,

    /// Move mode without a destination.
    #[error("mode \"move\" requires duplicates_folder")]
    MissingDuplicatesFolder,
}

/// What to do with duplicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolveMode {
    /// Permanent deletion
    #[default]
    Delete,
    /// System trash
    Trash,
    /// Move into `duplicates_folder`
    Move,
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Similarity sensitivity in `[0, 1]`
    pub sensitivity: f64,
    /// Worker threads; unset means one per core
    pub threads: Option<usize>,
    /// Later videos compared against each video
    pub video_compare_limit: usize,
    /// Count only, touch nothing
    pub dry_run: bool,
    /// Resolution mode
    pub mode: ResolveMode,
    /// Destination for `mode = "move"`
    pub duplicates_folder: Option<PathBuf>,
    /// CSV operation log to append to
    pub operation_log: Option<PathBuf>,
    /// Skip hidden files and directories
    pub skip_hidden: bool,
    /// Follow symbolic links
    pub follow_symlinks: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sensitivity: DEFAULT_SENSITIVITY,
            threads: None,
            video_compare_limit: DEFAULT_VIDEO_COMPARE_LIMIT,
            dry_run: false,
            mode: ResolveMode::Delete,
            duplicates_folder: None,
            operation_log: None,
            skip_hidden: false,
            follow_symlinks: false,
        }
    }
}

impl Config {
    /// Default platform-specific config file path.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "photodupe", "photodupe")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Figment with defaults, the optional TOML file and the environment.
    #[must_use]
    pub fn figment(file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = file {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX))
    }

    /// Load configuration.
    ///
    /// An explicit `path` must exist; without one, the default path is used
    /// when present.
    ///
    /// # Errors
    ///
    /// Returns an error if the explicit file is missing or any layer is
    /// malformed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(p) if !p.exists() => return Err(ConfigError::NotFound(p.to_path_buf())),
            Some(p) => Some(p.to_path_buf()),
            None => Self::default_path().filter(|p| p.exists()),
        };

        if let Some(ref f) = file {
            log::debug!("Loading config from {}", f.display());
        }

        let config: Config = Self::figment(file.as_deref())
            .extract()
            .map_err(Box::new)?;
        Ok(config)
    }

    /// Override with flags given on the command line.
    pub fn apply_cli(&mut self, args: &DedupArgs) {
        if let Some(sensitivity) = args.sensitivity {
            self.sensitivity = sensitivity;
        }
        if args.threads.is_some() {
            self.threads = args.threads;
        }
        if let Some(limit) = args.video_compare_limit {
            self.video_compare_limit = limit;
        }
        if args.dry_run {
            self.dry_run = true;
        }
        if args.delete {
            self.mode = ResolveMode::Delete;
        }
        if args.trash {
            self.mode = ResolveMode::Trash;
        }
        if let Some(ref folder) = args.move_to {
            self.mode = ResolveMode::Move;
            self.duplicates_folder = Some(folder.clone());
        }
        if args.log.is_some() {
            self.operation_log = args.log.clone();
        }
        if args.skip_hidden {
            self.skip_hidden = true;
        }
        if args.follow_symlinks {
            self.follow_symlinks = true;
        }
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.sensitivity) {
            return Err(ConfigError::InvalidSensitivity(self.sensitivity));
        }
        if self.threads == Some(0) {
            return Err(ConfigError::ZeroThreads);
        }
        if self.video_compare_limit == 0 {
            return Err(ConfigError::ZeroCompareLimit);
        }
        if self.mode == ResolveMode::Move && self.duplicates_folder.is_none() {
            return Err(ConfigError::MissingDuplicatesFolder);
        }
        Ok(())
    }

    /// Finder settings. The duplicates folder is excluded from the walk.
    ///
    /// A relative duplicates folder is made absolute against the current
    /// directory, the same base the move itself uses.
    #[must_use]
    pub fn finder_config(&self) -> FinderConfig {
        let exclude_dirs = self
            .duplicates_folder
            .iter()
            .map(|folder| std::path::absolute(folder).unwrap_or_else(|_| folder.clone()))
            .collect();
        let walker = WalkerConfig {
            follow_symlinks: self.follow_symlinks,
            skip_hidden: self.skip_hidden,
            exclude_dirs,
        };
        FinderConfig::default()
            .with_sensitivity(self.sensitivity)
            .with_threads(self.threads)
            .with_video_compare_limit(self.video_compare_limit)
            .with_walker_config(walker)
    }

    /// Resolution settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingDuplicatesFolder`] for move mode
    /// without a folder.
    pub fn resolve_config(&self) -> Result<ResolveConfig, ConfigError> {
        let config = match self.mode {
            ResolveMode::Delete => ResolveConfig::delete(),
            ResolveMode::Trash => ResolveConfig::trash(),
            ResolveMode::Move => ResolveConfig::move_to(
                self.duplicates_folder
                    .clone()
                    .ok_or(ConfigError::MissingDuplicatesFolder)?,
            ),
        };
        Ok(config.with_dry_run(self.dry_run))
    }
}
