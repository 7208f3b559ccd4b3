//! Binding configuration
//!
//! Tuning knobs shared by every binding attached to one map. All fields have
//! defaults, so a partial TOML document is enough:
//!
//! ```
//! use mapsync_core::config::SyncConfig;
//!
//! let config = SyncConfig::from_toml_str(
//!     r#"
//!     fit_bounds_padding = 80.0
//!
//!     [retry]
//!     delay_ms = 250
//!     "#,
//! )
//! .unwrap();
//!
//! assert_eq!(config.retry.delay_ms, 250);
//! assert_eq!(config.retry.max_retries, 1);
//! assert_eq!(config.route_animation_ms, 2000);
//! ```

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bounded delayed retry for setups that can fail transiently
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before each retry, in milliseconds
    pub delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            delay_ms: 500,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries
    pub const fn none() -> Self {
        Self {
            max_retries: 0,
            delay_ms: 0,
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Configuration shared by the bindings of one map
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Retry policy for GPU overlay setup
    pub retry: RetryPolicy,
    /// Default padding, in pixels, when a route fits the camera to its path
    pub fit_bounds_padding: f64,
    /// Default duration of the route reveal animation, in milliseconds
    pub route_animation_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            fit_bounds_padding: 50.0,
            route_animation_ms: 2000,
        }
    }
}

impl SyncConfig {
    /// Parse a configuration from TOML
    pub fn from_toml_str(source: &str) -> Result<Self> {
        Ok(toml::from_str(source)?)
    }

    pub fn route_animation(&self) -> Duration {
        Duration::from_millis(self.route_animation_ms)
    }
}
