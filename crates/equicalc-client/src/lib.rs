//! # Equicalc Client
//!
//! Access to the remote calculation service.
//!
//! - [`CalculationService`] - async seam used by the orchestration layer
//! - [`HttpCalculationService`] - reqwest adapter for the JSON API
//! - [`ServiceError`] - network or service failure with a structured code
//! - [`ClientConfig`] - endpoints and timeouts from TOML plus environment
//!
//! ```no_run
//! use equicalc_client::{ClientConfig, HttpCalculationService};
//!
//! let config = ClientConfig::new("https://calc.example.com").apply_env()?;
//! let service = HttpCalculationService::new(&config)?;
//! # Ok::<(), equicalc_client::ConfigError>(())
//! ```

#![warn(unreachable_pub)]

pub mod config;
pub mod error;
pub mod http;
pub mod service;

pub use config::{ClientConfig, ConfigError};
pub use error::{CodeSource, ErrorCode, ErrorContext, ErrorKind, ServiceError};
pub use http::HttpCalculationService;
pub use service::{CalculationService, Endpoint};
