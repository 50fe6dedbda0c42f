//! Catalog reconciliation
//!
//! Merges freshly fetched registry records with the local enablement list.
//! Items are stored in fetch order and addressed by their stable mod name, so
//! callers showing a filtered or re-sorted view must resolve their selection
//! to a name before toggling.

pub mod search;

use crate::enablement::{EnablementList, LocalEnablementStore};
use crate::error::{Result, SyncError};
use crate::registry::{ModRecord, ModRegistry, PageOptions};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A registry record with its resolved enabled flag.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedCatalogItem {
    pub record: ModRecord,
    pub enabled: bool,
}

impl MergedCatalogItem {
    pub fn name(&self) -> &str {
        &self.record.name
    }
}

/// Items in registry order plus a name -> index map.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    items: Vec<MergedCatalogItem>,
    index: HashMap<String, usize>,
}

impl Catalog {
    /// Build a catalog; a repeated name keeps its first occurrence.
    pub fn from_items(items: Vec<MergedCatalogItem>) -> Self {
        let mut catalog = Catalog::default();
        for item in items {
            if catalog.index.contains_key(item.name()) {
                tracing::debug!("Dropping duplicate catalog entry '{}'", item.name());
                continue;
            }
            catalog
                .index
                .insert(item.name().to_string(), catalog.items.len());
            catalog.items.push(item);
        }
        catalog
    }

    pub fn items(&self) -> &[MergedCatalogItem] {
        &self.items
    }

    pub fn get(&self, name: &str) -> Option<&MergedCatalogItem> {
        self.index.get(name).map(|&i| &self.items[i])
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut MergedCatalogItem> {
        match self.index.get(name) {
            Some(&i) => self.items.get_mut(i),
            None => None,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn enabled(&self) -> impl Iterator<Item = &MergedCatalogItem> {
        self.items.iter().filter(|item| item.enabled)
    }

    /// Ranked fuzzy search over names and titles. See [`search::search`].
    pub fn search(&self, query: &str) -> Vec<&MergedCatalogItem> {
        search::search(self, query)
    }

    /// Set the flag for `name`, returning the previous value.
    fn set_flag(&mut self, name: &str, enabled: bool) -> Result<bool> {
        let item = self
            .get_mut(name)
            .ok_or_else(|| SyncError::NotFound(name.to_string()))?;
        let previous = item.enabled;
        item.enabled = enabled;
        Ok(previous)
    }
}

/// Overlay local flags on registry records. Names missing from the list are disabled.
pub fn reconcile(records: Vec<ModRecord>, list: &EnablementList) -> Catalog {
    let flags = list.flags();
    let items = records
        .into_iter()
        .map(|record| {
            let enabled = flags.get(record.name.as_str()).copied().unwrap_or(false);
            MergedCatalogItem { record, enabled }
        })
        .collect();
    Catalog::from_items(items)
}

/// Result of flipping or setting one flag, with a message for the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToggleOutcome {
    pub name: String,
    pub enabled: bool,
    pub message: String,
}

impl ToggleOutcome {
    fn new(name: &str, enabled: bool) -> Self {
        let verb = if enabled { "Enabled" } else { "Disabled" };
        Self {
            name: name.to_string(),
            enabled,
            message: format!("{} {}", verb, name),
        }
    }
}

/// Fetches pages from a registry and keeps the local list in step with toggles.
pub struct CatalogReconciler {
    registry: Arc<dyn ModRegistry>,
    store: Arc<LocalEnablementStore>,
}

impl CatalogReconciler {
    pub fn new(registry: Arc<dyn ModRegistry>, store: Arc<LocalEnablementStore>) -> Self {
        Self { registry, store }
    }

    pub fn store(&self) -> &LocalEnablementStore {
        &self.store
    }

    /// Fetch one page and merge it with the local list, keeping registry order.
    pub async fn load_catalog(
        &self,
        options: &PageOptions,
        cancel: &CancellationToken,
    ) -> Result<Catalog> {
        let records = self.registry.fetch_page(options, cancel).await?;
        let list = self.store.load_or_default().await?;
        let catalog = reconcile(records, &list);

        tracing::info!(
            "Loaded catalog: {} mods, {} enabled",
            catalog.len(),
            catalog.enabled().count()
        );
        Ok(catalog)
    }

    /// Fetch exactly the mods named in the local list and merge them.
    ///
    /// `base` carries version/deprecation settings; pagination and the name
    /// list are overridden. The `base` game entry is never queried.
    pub async fn load_local_catalog(
        &self,
        base: &PageOptions,
        cancel: &CancellationToken,
    ) -> Result<Catalog> {
        let list = self.store.load_or_default().await?;
        let names: Vec<String> = list
            .names()
            .into_iter()
            .filter(|name| name != "base")
            .collect();

        if names.is_empty() {
            tracing::info!("Local mod list has no portal mods");
            return Ok(Catalog::default());
        }

        let options = PageOptions {
            hide_deprecated: false,
            version: base.version,
            sort_by: base.sort_by,
            ..PageOptions::for_names(names)
        };
        let records = self.registry.fetch_page(&options, cancel).await?;
        let catalog = reconcile(records, &list);

        let missing: Vec<&str> = list
            .mods
            .iter()
            .map(|e| e.name.as_str())
            .filter(|name| *name != "base" && !catalog.contains(name))
            .collect();
        if !missing.is_empty() {
            tracing::warn!("Not found on the portal: {}", missing.join(", "));
        }

        Ok(catalog)
    }

    /// Flip the flag for `name` and persist it.
    pub async fn toggle_enable(&self, catalog: &mut Catalog, name: &str) -> Result<ToggleOutcome> {
        let current = catalog
            .get(name)
            .map(|item| item.enabled)
            .ok_or_else(|| SyncError::NotFound(name.to_string()))?;
        self.set_enabled(catalog, name, !current).await
    }

    /// Set the flag for `name` and persist it. On a failed save the in-memory
    /// flag is restored.
    pub async fn set_enabled(
        &self,
        catalog: &mut Catalog,
        name: &str,
        enabled: bool,
    ) -> Result<ToggleOutcome> {
        let previous = catalog.set_flag(name, enabled)?;

        if let Err(e) = self.persist(catalog, name).await {
            let _ = catalog.set_flag(name, previous);
            return Err(e);
        }

        let outcome = ToggleOutcome::new(name, enabled);
        tracing::info!("{}", outcome.message);
        Ok(outcome)
    }

    /// Write catalog flags back. Every enabled item, every item the list
    /// already knows, and `changed` are overwritten; other list entries are
    /// left alone so a partial page never drops them.
    async fn persist(&self, catalog: &Catalog, changed: &str) -> Result<()> {
        self.store
            .update(|list| {
                for item in catalog.items() {
                    let known = list.get(item.name()).is_some();
                    if item.enabled || known || item.name() == changed {
                        list.set(item.name(), item.enabled);
                    }
                }
            })
            .await?;
        Ok(())
    }
}
