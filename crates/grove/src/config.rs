//! Runtime configuration.
//!
//! Settings come from defaults overlaid with environment variables. The
//! overlay is written against a lookup function so tests can drive it
//! without touching the process environment.

use std::env;
use std::ffi::OsString;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

use crate::loader::{GrammarLoader, PARSERS_ENV};

/// Environment variable overriding [`Config::log_filter`].
pub const LOG_FILTER_ENV: &str = "GROVE_LOG_FILTER";
/// Environment variable overriding [`Config::log_format`].
pub const LOG_FORMAT_ENV: &str = "GROVE_LOG_FORMAT";

const DEFAULT_LOG_FILTER: &str = "info";

/// Supported logging output formats.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// Structured JSON suitable for ingestion by logging stacks.
    #[default]
    Json,
    /// Human-readable single line output.
    Compact,
}

/// Errors raised while reading configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A variable held a value that is not valid Unicode.
    #[error("{variable} is not valid unicode")]
    NotUnicode {
        /// Offending variable.
        variable: &'static str,
    },
    /// The log format was not recognised.
    #[error("invalid {LOG_FORMAT_ENV} value `{value}`: {source}")]
    LogFormat {
        /// Rejected value.
        value: String,
        /// Parse failure.
        #[source]
        source: strum::ParseError,
    },
}

/// Settings for telemetry and grammar discovery.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    log_filter: String,
    log_format: LogFormat,
    parser_paths: Vec<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: DEFAULT_LOG_FILTER.to_owned(),
            log_format: LogFormat::default(),
            parser_paths: Vec::new(),
        }
    }
}

impl Config {
    /// Defaults overlaid with the process environment.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when a variable holds an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var_os(name))
    }

    /// Defaults overlaid with whatever `lookup` returns for each variable.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when a variable holds an invalid value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let mut config = Self::default();
        if let Some(filter) = text(&lookup, LOG_FILTER_ENV)? {
            config.log_filter = filter;
        }
        if let Some(format) = text(&lookup, LOG_FORMAT_ENV)? {
            config.log_format = format
                .parse()
                .map_err(|source| ConfigError::LogFormat {
                    value: format.clone(),
                    source,
                })?;
        }
        if let Some(paths) = lookup(PARSERS_ENV) {
            config.parser_paths = env::split_paths(&paths)
                .filter(|path| !path.as_os_str().is_empty())
                .collect();
        }
        Ok(config)
    }

    /// Tracing filter directive.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Extra grammar directories, searched before the defaults.
    #[must_use]
    pub fn parser_paths(&self) -> &[PathBuf] {
        &self.parser_paths
    }

    /// Replaces the log filter.
    #[must_use]
    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = filter.into();
        self
    }

    /// Replaces the log format.
    #[must_use]
    pub const fn with_log_format(mut self, format: LogFormat) -> Self {
        self.log_format = format;
        self
    }

    /// Grammar loader searching [`Config::parser_paths`] first.
    #[must_use]
    pub fn grammar_loader(&self) -> GrammarLoader {
        GrammarLoader::default().with_dirs(self.parser_paths.iter().cloned())
    }
}

fn text<F>(lookup: &F, variable: &'static str) -> Result<Option<String>, ConfigError>
where
    F: Fn(&str) -> Option<OsString>,
{
    lookup(variable)
        .map(|value| {
            value
                .into_string()
                .map_err(|_| ConfigError::NotUnicode { variable })
        })
        .transpose()
}
