//! Configuration loading, env substitution, validation, and credential resolution.
//!
//! Config files live in the data directory: `config.yaml`, `config.yml`,
//! `config.toml`, or `config.json` (first match wins). A default `config.yaml`
//! is written on first start.
//!
//! Supports `${ENV_VAR}` and `${ENV_VAR:-fallback}` substitution in the raw file.

pub mod credentials;
pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    credentials::Credentials,
    error::{Error, Result},
    loader::{default_data_dir, find_config_file, load_config, load_dotenv, load_or_init},
    schema::{EndpointsConfig, RelayConfig},
    validate::{Diagnostic, Severity, ValidationResult, validate},
};
