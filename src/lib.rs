//! factorio-mod-sync - sync Factorio mods from the mod portal
//!
//! This crate provides:
//! - A mod portal client with paging, filtering and client-side sorting
//! - Reconciliation of portal records with the local `mod-list.json`
//! - Fuzzy catalog search
//! - Idempotent, authenticated archive downloads

pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod app;
pub mod catalog;
pub mod config;
pub mod download;
pub mod enablement;
pub mod error;
pub mod registry;

pub use app::App;
pub use catalog::{Catalog, CatalogReconciler, MergedCatalogItem, ToggleOutcome};
pub use config::{Config, ServerCredentials};
pub use download::{ArchiveFetcher, DependencyResolver, DownloadOutcome, DownloadReport, Downloader};
pub use enablement::{EnablementEntry, EnablementList, LocalEnablementStore};
pub use error::{Result, SyncError};
pub use registry::{ModRecord, ModRegistry, PageOptions, RegistryClient, ReleaseRecord};
