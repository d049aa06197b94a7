//! Classification pipeline for orgscan.
//!
//! Leaf-first:
//! - [`query`]: name-variant-aware boolean query construction
//! - [`matcher`]: keyword/exclusion validation of search results
//! - [`classifier`]: one row: query → search → validate
//! - [`controller`]: the resumable run over a whole sheet

pub mod classifier;
pub mod controller;
pub mod matcher;
pub mod query;

pub use classifier::{Classification, RowClassifier};
pub use controller::{RunController, RunReporter, SilentReporter};
pub use matcher::MatchValidator;
pub use query::{build_query, name_variants};
