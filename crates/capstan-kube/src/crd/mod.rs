//! Schema-definition (CRD) handling
//!
//! - **Object model** (`object`): encoding-tagged schema definitions; the
//!   wire encoding is probed once per document
//! - **Store access** (`client`): typed get/create/update with dry-run and
//!   concurrency-token support, plus the test mock
//! - **Migration** (`migrate`): the validate-then-commit engine enforcing
//!   the no-removal and storage-version invariants

mod client;
mod migrate;
mod object;

pub use client::{
    ClusterSchemaClient, DEFAULT_SCHEMA_CALL_TIMEOUT, ExistingSchema, SchemaClient,
    mock::{MockSchemaClient, SchemaOps},
};
pub use migrate::{MigrationOutcome, MigrationReport, MigrationSkip, SchemaMigrator};
pub use object::{ApiEncoding, SchemaDefinition, SchemaVersion};
