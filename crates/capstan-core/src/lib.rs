//! Capstan Core - foundational types for the release orchestrator
//!
//! This crate provides the types shared by the rest of Capstan:
//! - `Chart`: the package definition and its loaded in-memory form
//! - `Values`: configuration values with deep merge support
//! - `Release`: deployment state tracking
//! - lint rules run before any render
//! - chart archive reading

pub mod archive;
pub mod chart;
pub mod error;
pub mod lint;
pub mod release;
pub mod values;

pub use chart::{
    BundledArchive, Chart, ChartDependency, ChartKind, ChartMetadata, ChartReference, CrdDocument,
    LoadedChart,
};
pub use error::{CoreError, Result};
pub use lint::{LintCode, LintViolation, lint_chart};
pub use release::{Release, ReleaseStatus, StatusMask};
pub use values::{RESERVED_VALUES_KEY, Values};
