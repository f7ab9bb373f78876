//! Index configuration module.
//!
//! Loads the settings used by the `strindex` binary from environment
//! variables. Library users can build [`IndexOptions`] directly instead.
//!
//! # Environment Variables
//!
//! - `STRINDEX_PATH`: Backing file of the index (default: `./index.db`)
//! - `STRINDEX_FANOUT`: Maximum keys per node (default: `12`)
//! - `STRINDEX_LABEL`: Index label, used when creating a new index (default: empty)
//!
//! # Invariants
//!
//! - `fanout` is always in `2..=MAX_FANOUT`
//! - `label` is at most `MAX_LABEL_LEN` bytes

use std::path::PathBuf;

use crate::index::{DEFAULT_FANOUT, IndexOptions, MAX_FANOUT, MAX_LABEL_LEN};

/// Index configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexConfig {
    /// File holding the index.
    pub path: PathBuf,
    /// Maximum keys per node for a newly created index.
    /// An existing index keeps the fanout it was created with.
    pub fanout: usize,
    /// Label for a newly created index.
    pub label: String,
}

/// Error returned when loading configuration fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    InvalidValue { name: String, message: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { name, message } => {
                write!(f, "invalid value for {name}: {message}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(Self::DEFAULT_PATH),
            fanout: DEFAULT_FANOUT,
            label: String::new(),
        }
    }
}

impl IndexConfig {
    /// Default index file.
    pub const DEFAULT_PATH: &'static str = "./index.db";

    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `STRINDEX_FANOUT` is set but not an integer in `2..=MAX_FANOUT`
    /// - `STRINDEX_LABEL` is longer than `MAX_LABEL_LEN` bytes
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let path = lookup("STRINDEX_PATH")
            .map_or_else(|| PathBuf::from(Self::DEFAULT_PATH), PathBuf::from);
        let fanout = Self::parse_fanout(lookup("STRINDEX_FANOUT").as_deref())?;
        let label = Self::parse_label(lookup("STRINDEX_LABEL"))?;

        Ok(Self {
            path,
            fanout,
            label,
        })
    }

    fn parse_fanout(value: Option<&str>) -> Result<usize, ConfigError> {
        let Some(value) = value else {
            return Ok(DEFAULT_FANOUT);
        };

        match value.parse::<usize>() {
            Ok(fanout) if (2..=MAX_FANOUT).contains(&fanout) => Ok(fanout),
            _ => Err(ConfigError::InvalidValue {
                name: "STRINDEX_FANOUT".to_string(),
                message: format!("'{value}' is not a valid fanout (must be 2-{MAX_FANOUT})"),
            }),
        }
    }

    fn parse_label(value: Option<String>) -> Result<String, ConfigError> {
        let label = value.unwrap_or_default();
        if label.len() > MAX_LABEL_LEN {
            return Err(ConfigError::InvalidValue {
                name: "STRINDEX_LABEL".to_string(),
                message: format!("must be at most {MAX_LABEL_LEN} bytes"),
            });
        }
        Ok(label)
    }

    /// Options for creating a new index with this configuration.
    #[must_use]
    pub fn index_options(&self) -> IndexOptions {
        IndexOptions {
            id: 0,
            label: self.label.clone(),
            fanout: self.fanout,
        }
    }
}
