//! Application Configuration Module
//!
//! Provides the operator-tunable settings for the corpus, chunker, model
//! server, index and HTTP API, loaded from a TOML file.
//!
//! ## Loading Order
//!
//! 1. `REPO_QA_CONFIG` environment variable (path to TOML file)
//! 2. `repo_qa.toml` in the current working directory
//! 3. Built-in defaults
//!
//! The loaded config is passed explicitly to the components that need it;
//! there is no global instance.

mod app_config;
pub mod defaults;

pub use app_config::*;
