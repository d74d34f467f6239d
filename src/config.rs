//! Configuration options for different safer-promise use cases.
//!
//! The configuration is process-wide: it is installed once with [`install`]
//! and read by every operation through [`current`]. When nothing is installed
//! the defaults apply.

use std::sync::OnceLock;

use crate::error::{PromiseError, Result};
use crate::logging::LogLevel;
use crate::operation::CreationOptions;

/// Comprehensive configuration for safer-promise.
#[derive(Debug, Clone, Default)]
pub struct PromiseConfig {
    /// Completion race configuration
    pub spin: SpinConfig,
    /// Continuation dispatch configuration
    pub dispatch: DispatchConfig,
    /// Logging and debugging configuration
    pub logging: LoggingConfig,
}

/// Bounded wait used by a caller that lost the completion race.
///
/// The loser spins until the winner has published the terminal status, so
/// that a `false` return always means "already completed" rather than
/// "about to be completed".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpinConfig {
    /// Maximum number of checks before giving up
    pub max_spins: u32,
    /// Number of busy checks before switching to yielding the thread
    pub yield_after: u32,
}

/// Continuation dispatch configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchConfig {
    /// Options OR-ed into every operation created through the builder
    pub default_options: CreationOptions,
}

/// Logging and debugging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Install a subscriber from [`crate::logging::init_logging`]
    pub enabled: bool,
    /// Minimum log level
    pub level: LogLevel,
    /// Use JSON format for logs
    pub json_format: bool,
    /// Emit a trace event for every status transition
    pub trace_transitions: bool,
}

impl Default for SpinConfig {
    fn default() -> Self {
        Self {
            max_spins: 1_000,
            yield_after: 64,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            level: LogLevel::Info,
            json_format: false,
            trace_transitions: false,
        }
    }
}

impl PromiseConfig {
    /// Configuration for latency-sensitive callers.
    ///
    /// Losers of a completion race spin longer before yielding, and logging is
    /// limited to errors.
    pub fn low_latency() -> Self {
        Self {
            spin: SpinConfig {
                max_spins: 10_000,
                yield_after: 1_000,
            },
            logging: LoggingConfig {
                level: LogLevel::Error,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Configuration with verbose diagnostics.
    pub fn development() -> Self {
        Self {
            logging: LoggingConfig {
                enabled: true,
                level: LogLevel::Debug,
                json_format: false,
                trace_transitions: true,
            },
            ..Default::default()
        }
    }

    /// Configuration for production services.
    ///
    /// Continuations never run on the completing thread, and logs are JSON.
    pub fn production() -> Self {
        Self {
            dispatch: DispatchConfig {
                default_options: CreationOptions::RUN_CONTINUATIONS_ASYNCHRONOUSLY,
            },
            logging: LoggingConfig {
                enabled: true,
                level: LogLevel::Warn,
                json_format: true,
                trace_transitions: false,
            },
            ..Default::default()
        }
    }

    /// Validate the configuration for consistency.
    ///
    /// # Errors
    ///
    /// Returns [`PromiseError::InvalidConfig`] describing the first problem.
    pub fn validate(&self) -> Result<()> {
        if self.spin.max_spins == 0 {
            return Err(PromiseError::InvalidConfig(
                "max_spins must be greater than 0".to_string(),
            ));
        }

        if self.spin.yield_after > self.spin.max_spins {
            return Err(PromiseError::InvalidConfig(format!(
                "yield_after ({}) must not exceed max_spins ({})",
                self.spin.yield_after, self.spin.max_spins
            )));
        }

        Ok(())
    }
}

/// Configuration builder for fluent configuration creation.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: PromiseConfig,
}

impl ConfigBuilder {
    /// Create a new configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set spin configuration.
    pub fn spin(mut self, spin: SpinConfig) -> Self {
        self.config.spin = spin;
        self
    }

    /// Set dispatch configuration.
    pub fn dispatch(mut self, dispatch: DispatchConfig) -> Self {
        self.config.dispatch = dispatch;
        self
    }

    /// Set logging configuration.
    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.config.logging = logging;
        self
    }

    /// Build the final configuration.
    pub fn build(self) -> Result<PromiseConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

static INSTALLED: OnceLock<PromiseConfig> = OnceLock::new();
static DEFAULT: OnceLock<PromiseConfig> = OnceLock::new();

/// Installs the process-wide configuration.
///
/// # Errors
///
/// Returns [`PromiseError::InvalidConfig`] if validation fails, or
/// [`PromiseError::InvalidOperation`] if a configuration was already
/// installed.
pub fn install(config: PromiseConfig) -> Result<()> {
    config.validate()?;
    INSTALLED
        .set(config)
        .map_err(|_| PromiseError::InvalidOperation("configuration is already installed"))?;
    tracing::debug!(config = ?current(), "installed configuration");
    Ok(())
}

/// The configuration in effect: the installed one, or the defaults.
pub fn current() -> &'static PromiseConfig {
    INSTALLED
        .get()
        .unwrap_or_else(|| DEFAULT.get_or_init(PromiseConfig::default))
}
