//! Release records and status filtering

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chart::ChartMetadata;
use crate::values::Values;

/// Release status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ReleaseStatus {
    PendingInstall,
    PendingUpgrade,
    PendingRollback,
    Deployed,
    Failed,
    Superseded,
    Uninstalled,
}

impl ReleaseStatus {
    const fn bit(self) -> u8 {
        match self {
            Self::PendingInstall => 1 << 0,
            Self::PendingUpgrade => 1 << 1,
            Self::PendingRollback => 1 << 2,
            Self::Deployed => 1 << 3,
            Self::Failed => 1 << 4,
            Self::Superseded => 1 << 5,
            Self::Uninstalled => 1 << 6,
        }
    }

    /// Whether the release has reached a terminal state
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Superseded | Self::Uninstalled)
    }
}

impl std::fmt::Display for ReleaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::PendingInstall => "pending-install",
            Self::PendingUpgrade => "pending-upgrade",
            Self::PendingRollback => "pending-rollback",
            Self::Deployed => "deployed",
            Self::Failed => "failed",
            Self::Superseded => "superseded",
            Self::Uninstalled => "uninstalled",
        };
        write!(f, "{}", s)
    }
}

/// Bit-set filter over release statuses, used when listing history
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusMask(u8);

impl StatusMask {
    /// Every status
    pub const ALL: Self = Self(0x7f);

    /// Only deployed releases
    pub const DEPLOYED: Self = Self(ReleaseStatus::Deployed.bit());

    /// Statuses that make a release "active": deployed plus the pending
    /// states. At most one release per (name, namespace) may be active.
    pub const ACTIVE: Self = Self(
        ReleaseStatus::Deployed.bit()
            | ReleaseStatus::PendingInstall.bit()
            | ReleaseStatus::PendingUpgrade.bit()
            | ReleaseStatus::PendingRollback.bit(),
    );

    /// A mask matching a single status
    pub fn only(status: ReleaseStatus) -> Self {
        Self(status.bit())
    }

    /// Combine two masks
    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Whether a status is selected by this mask
    pub fn matches(self, status: ReleaseStatus) -> bool {
        self.0 & status.bit() != 0
    }
}

impl Default for StatusMask {
    fn default() -> Self {
        Self::ALL
    }
}

/// A deployed (or historical) release of a chart
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Release {
    /// Release name
    pub name: String,

    /// Target namespace
    pub namespace: String,

    /// Revision number (1-indexed, increments with each upgrade)
    pub revision: u32,

    /// Current status
    pub status: ReleaseStatus,

    /// Chart metadata at deploy time
    pub chart: ChartMetadata,

    /// Final composed values
    pub values: Values,

    /// Rendered manifest text
    pub manifest: String,

    /// Lifecycle-hook manifests
    #[serde(default)]
    pub hooks: Vec<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Release {
    /// Create the first revision of a new release
    pub fn for_install(
        name: String,
        namespace: String,
        chart: ChartMetadata,
        values: Values,
        manifest: String,
        hooks: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            name,
            namespace,
            revision: 1,
            status: ReleaseStatus::PendingInstall,
            chart,
            values,
            manifest,
            hooks,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create the next revision from a previous one
    pub fn for_upgrade(
        previous: &Release,
        chart: ChartMetadata,
        values: Values,
        manifest: String,
        hooks: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            name: previous.name.clone(),
            namespace: previous.namespace.clone(),
            revision: previous.revision + 1,
            status: ReleaseStatus::PendingUpgrade,
            chart,
            values,
            manifest,
            hooks,
            created_at: now,
            updated_at: now,
        }
    }

    /// Storage key for this revision
    pub fn storage_key(&self) -> String {
        format!("capstan.release.v1.{}.v{}", self.name, self.revision)
    }

    pub fn mark_deployed(&mut self) {
        self.set_status(ReleaseStatus::Deployed);
    }

    pub fn mark_failed(&mut self) {
        self.set_status(ReleaseStatus::Failed);
    }

    pub fn mark_superseded(&mut self) {
        self.set_status(ReleaseStatus::Superseded);
    }

    pub fn mark_uninstalled(&mut self) {
        self.set_status(ReleaseStatus::Uninstalled);
    }

    fn set_status(&mut self, status: ReleaseStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}
