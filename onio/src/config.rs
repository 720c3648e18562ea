//! Application configuration.
//!
//! Use [`AppBuilder`] to configure an [`App`] before it starts receiving
//! events:
//!
//! ```rust,ignore
//! let app = App::builder()
//!     .delivery(Delivery::Concurrent)
//!     .with(LoggingMiddleware::new())
//!     .build();
//! ```

use crate::app::App;
use onio_core::{DynMiddleware, Middleware};
use std::sync::Arc;

/// How events arriving on one connection are scheduled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Delivery {
    /// Dispatch events of a connection one after another, in arrival order.
    #[default]
    Sequential,
    /// Spawn one task per event; dispatches of a connection may interleave.
    Concurrent,
}

/// Settings of an [`App`].
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Scheduling of events within one connection.
    pub delivery: Delivery,
    /// Convert panics in middleware and listeners into faults.
    pub catch_panics: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            delivery: Delivery::Sequential,
            catch_panics: true,
        }
    }
}

/// Builder for constructing an [`App`].
#[derive(Default)]
pub struct AppBuilder {
    config: AppConfig,
    middleware: Vec<Arc<dyn DynMiddleware>>,
}

impl AppBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration.
    pub fn from_config(config: AppConfig) -> Self {
        Self {
            config,
            middleware: Vec::new(),
        }
    }

    /// Set the per-connection delivery mode.
    pub fn delivery(mut self, delivery: Delivery) -> Self {
        self.config.delivery = delivery;
        self
    }

    /// Enable or disable panic capture.
    pub fn catch_panics(mut self, enabled: bool) -> Self {
        self.config.catch_panics = enabled;
        self
    }

    /// Append a middleware to the chain.
    pub fn with<M: Middleware>(mut self, middleware: M) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// The configuration collected so far.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Build the application.
    pub fn build(self) -> App {
        App::from_parts(self.config, self.middleware)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.delivery, Delivery::Sequential);
        assert!(config.catch_panics);
    }

    #[test]
    fn test_builder_settings() {
        let builder = AppBuilder::new()
            .delivery(Delivery::Concurrent)
            .catch_panics(false);
        assert_eq!(builder.config().delivery, Delivery::Concurrent);
        assert!(!builder.config().catch_panics);
    }
}
