//! Shared contracts for the migration harness.
//!
//! This crate defines the pieces the harness binary composes: the error
//! taxonomy, the resolved-tool and outcome types, the cache-store and host
//! reporter traits, and the pure target-list / URL-masking logic.
//!
//! # API notes
//! `migrate-core` is an internal crate (`publish = false`). Fatal failure
//! categories are modeled as [`Error`] variants; a migration that exits
//! non-zero is *not* an error, it is a [`MigrationOutcome`] with
//! `succeeded = false`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub mod connlist;
pub mod mask;

pub type Result<T> = std::result::Result<T, Error>;

/// Fatal failure categories.
///
/// The first three abort the run before any migration is attempted; there is
/// nothing meaningful to do without a parsed target list and a working tool.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The target list parsed to zero connection strings.
    #[error("no database targets provided")]
    NoTargets,

    /// The caller signaled structured intent (leading `[`) but the JSON
    /// string array did not parse.
    #[error("database target list is not a valid JSON string array")]
    InvalidTargetList(#[source] anyhow::Error),

    /// The registry was unreachable or answered with a non-success status.
    #[error("registry request failed")]
    Registry(#[source] anyhow::Error),

    /// The selector names neither a known version nor a known dist-tag.
    #[error("unknown tool version or dist-tag: {selector:?}")]
    VersionNotFound { selector: String },

    #[error("tool archive download failed")]
    Download(#[source] anyhow::Error),

    #[error("tool archive extraction failed")]
    Extraction(#[source] anyhow::Error),

    /// The extracted tree does not contain the executable entry point at its
    /// conventional relative path.
    #[error("tool entry point missing at {}", path.display())]
    EntryMissing { path: PathBuf },

    /// Transport-level fault outside the named categories (spawn, io).
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A concrete, registry-known tool version and where to fetch it.
///
/// `version` is always a key of the registry `versions` map, never a tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTool {
    pub version: String,
    pub tarball_url: String,
}

/// Recorded result of attempting migration against one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationOutcome {
    pub masked_target: String,
    pub succeeded: bool,
    pub exit_code: i32,
    pub duration_ms: u64,
}

/// Terminal artifact of one orchestrator run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub outcomes: Vec<MigrationOutcome>,
    pub any_failed: bool,
}

/// Version-keyed store for downloaded tools, shared across runs on a host.
///
/// Entries are write-once, read-many: `publish` moves a fully-populated
/// staging directory into place, and the store never evicts. Callers stage
/// under [`CacheStore::staging_root`] so `publish` can be a single rename on
/// the same filesystem; a racer that finds the entry already published must
/// treat the existing entry as authoritative.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Existing cached tree for `(tool, version)`, if any.
    async fn lookup(&self, tool: &str, version: &str) -> Result<Option<PathBuf>>;

    /// Move `staged` into the cache under `(tool, version)` and return the
    /// published path.
    async fn publish(&self, tool: &str, version: &str, staged: &Path) -> Result<PathBuf>;

    /// Directory to stage content in before `publish`.
    async fn staging_root(&self) -> Result<PathBuf>;
}

/// Host-side facilities the orchestrator reports into.
///
/// These are thin adapters over the surrounding CI system (secret redaction,
/// log grouping, step outputs). All methods are best-effort; implementations
/// must not fail the run.
pub trait Reporter: Send + Sync {
    /// Register a value with the host's secret-redaction facility so it never
    /// reaches persisted logs, even if URL masking has a gap.
    fn register_secret(&self, value: &str);

    fn start_group(&self, title: &str);
    fn end_group(&self);

    /// Publish a named step output.
    fn set_output(&self, name: &str, value: &str);

    /// Append a directory to the host's executable search path.
    fn add_path(&self, dir: &Path);
}
