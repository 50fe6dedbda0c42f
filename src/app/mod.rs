//! Application state and orchestration

mod actions;

use crate::catalog::{reconcile, Catalog, CatalogReconciler};
use crate::config::Config;
use crate::enablement::LocalEnablementStore;
use crate::registry::{FactorioVersion, ModRegistry, PageOptions, PageSize, RegistryClient, SortBy};

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Per-invocation overrides for a catalog query. Unset fields fall back to config.
#[derive(Debug, Clone, Default)]
pub struct CatalogQuery {
    pub page: u32,
    pub page_size: Option<String>,
    pub version: Option<String>,
    pub sort: Option<String>,
    pub include_deprecated: bool,
}

impl CatalogQuery {
    fn page_options(&self, config: &Config) -> Result<PageOptions> {
        let mut options = config.page_options()?;
        options.page = self.page;
        if let Some(size) = &self.page_size {
            options.page_size = PageSize::from_cli(size)?;
        }
        if let Some(version) = &self.version {
            options.version = FactorioVersion::from_cli(version)?;
        }
        if let Some(sort) = &self.sort {
            options.sort_by = SortBy::from_cli(sort)?;
        }
        if self.include_deprecated {
            options.hide_deprecated = false;
        }
        Ok(options)
    }
}

/// Main application struct that orchestrates all components
pub struct App {
    /// Application configuration
    pub config: Config,

    /// Mod portal client, shared by catalog loads and downloads
    registry: RegistryClient,

    /// Catalog fetch/merge/toggle over the local mod list
    reconciler: CatalogReconciler,

    /// Cancelled on Ctrl-C
    cancel: CancellationToken,
}

impl App {
    /// Create a new App instance
    pub async fn new(config: Config) -> Result<Self> {
        // Ensure directories exist
        config.ensure_dirs().context("Failed to create directories")?;

        let registry = RegistryClient::new(&config.registry_url, config.request_timeout())
            .context("Failed to initialize mod portal client")?;

        let store = Arc::new(LocalEnablementStore::new(config.mod_list_file()));
        let reconciler = CatalogReconciler::new(Arc::new(registry.clone()), store);

        tracing::debug!(
            "Using registry {} and mod list {}",
            registry.base_url(),
            config.mod_list_file().display()
        );

        Ok(Self {
            config,
            registry,
            reconciler,
            cancel: CancellationToken::new(),
        })
    }

    /// Token that aborts in-flight requests and downloads when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Catalog of the mods named in the local list.
    async fn local_catalog(&self) -> Result<Catalog> {
        let base = self.config.page_options()?;
        let catalog = self
            .reconciler
            .load_local_catalog(&base, &self.cancel)
            .await
            .context("Failed to load local mods from the portal")?;
        Ok(catalog)
    }

    /// Local catalog, or a one-item catalog when `name` is not listed locally yet.
    async fn catalog_containing(&self, name: &str) -> Result<Catalog> {
        let catalog = self.local_catalog().await?;
        if catalog.contains(name) {
            return Ok(catalog);
        }

        let record = self.registry.fetch_one(name, false, &self.cancel).await?;
        let list = self.reconciler.store().load_or_default().await?;
        Ok(reconcile(vec![record], &list))
    }
}
