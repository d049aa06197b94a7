//! Shared types, error model, and configuration for orgscan.
//!
//! This crate is the foundation depended on by all other orgscan crates.
//! It provides:
//! - [`OrgScanError`]: the unified error type
//! - Domain types ([`Row`], [`SearchItem`], [`TopicProfile`], [`RunSummary`])
//! - Configuration ([`AppConfig`], [`RunConfig`], config loading)
//! - Built-in topic profiles ([`topics`])

pub mod config;
pub mod error;
pub mod topics;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, JournalConfig, RunConfig, RunDefaults, SearchConfig, SheetBackend, SheetConfig,
    config_dir, config_file_path, init_config, init_config_at, journal_path, load_config,
    load_config_from, read_secret,
};
pub use error::{OrgScanError, Result};
pub use types::{
    OutcomeKind, Row, RowOutcome, RunStatus, RunSummary, SearchItem, TopicProfile, VerdictCell,
    verdict_cell_value,
};
