//! Factorio mod portal integration

pub mod client;
pub mod dependency;
pub mod model;
pub mod options;

pub use client::{RegistryClient, DEFAULT_REGISTRY_URL};
pub use dependency::{Dependency, DependencyKind, VersionOp, VersionRequirement};
pub use model::{InfoJson, License, ModImage, ModRecord, ReleaseRecord, Tag};
pub use options::{FactorioVersion, PageOptions, PageSize, SortBy};

use crate::error::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Read access to the mod registry.
///
/// Implementations are stateless, so calls may run in parallel.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModRegistry: Send + Sync {
    /// One page of mods, sorted client-side by `options.sort_by`.
    async fn fetch_page(
        &self,
        options: &PageOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<ModRecord>>;

    /// A single mod; `full` selects the variant with changelog and release history.
    async fn fetch_one(
        &self,
        name: &str,
        full: bool,
        cancel: &CancellationToken,
    ) -> Result<ModRecord>;
}
