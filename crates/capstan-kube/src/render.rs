//! External collaborator contracts
//!
//! Chart loading and template rendering are not Capstan's business: the
//! orchestrator consumes them through these traits and callers inject real
//! implementations (or mocks in tests).

use async_trait::async_trait;

use capstan_core::{ChartReference, LoadedChart, Values};
use capstan_repo::VersionConstraint;

use crate::error::{KubeError, Result};

/// Resolves a chart reference to an in-memory chart.
///
/// For remote references, the constraint picks the version; the caller
/// always passes an explicit constraint (the orchestrator defaults an
/// unset one to match-anything).
#[async_trait]
pub trait ChartLoader: Send + Sync {
    async fn load(
        &self,
        reference: &ChartReference,
        constraint: &VersionConstraint,
    ) -> Result<LoadedChart>;
}

/// Output of a successful render
#[derive(Debug, Clone, Default)]
pub struct Rendered {
    /// Rendered manifest text
    pub manifest: String,

    /// Lifecycle-hook manifests, in execution order
    pub hooks: Vec<String>,
}

/// A render failure, possibly carrying partial output for caller debugging
#[derive(Debug)]
pub struct RenderFailure {
    pub message: String,

    /// Whatever the renderer produced before failing, if anything
    pub partial: Option<Rendered>,
}

impl From<RenderFailure> for KubeError {
    fn from(failure: RenderFailure) -> Self {
        KubeError::Render {
            message: failure.message,
            partial: failure.partial.map(|r| r.manifest),
        }
    }
}

/// Renders a chart plus composed values into manifest text
pub trait Renderer: Send + Sync {
    fn render(
        &self,
        chart: &LoadedChart,
        values: &Values,
    ) -> std::result::Result<Rendered, RenderFailure>;
}
