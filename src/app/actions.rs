//! CLI command action handlers

use super::{App, CatalogQuery};
use crate::catalog::MergedCatalogItem;
use crate::config::ServerCredentials;
use crate::download::{remove_archives, DependencyResolver, DownloadOutcome, Downloader};
use crate::registry::ModRegistry;
use anyhow::{bail, Context, Result};
use std::sync::Arc;

impl App {
    // ========== Catalog Commands ==========

    pub async fn cmd_list(&self, query: &CatalogQuery, local: bool) -> Result<()> {
        let catalog = if local {
            self.local_catalog().await?
        } else {
            let options = query.page_options(&self.config)?;
            self.reconciler.load_catalog(&options, &self.cancel).await?
        };

        if catalog.is_empty() {
            println!("No mods found.");
            return Ok(());
        }

        println!(
            "Mods ({} total, {} enabled):",
            catalog.len(),
            catalog.enabled().count()
        );
        println!("{:-<60}", "");
        for item in catalog.items() {
            print_row(item);
        }
        Ok(())
    }

    pub async fn cmd_search(&self, query: &str, catalog_query: &CatalogQuery) -> Result<()> {
        let mut catalog_query = catalog_query.clone();
        catalog_query.page_size.get_or_insert_with(|| "max".to_string());
        let options = catalog_query.page_options(&self.config)?;

        let catalog = self.reconciler.load_catalog(&options, &self.cancel).await?;
        let hits = catalog.search(query);

        if hits.is_empty() {
            println!("No mods match '{}'.", query);
            return Ok(());
        }

        println!("Results for '{}' ({}):", query, hits.len());
        println!("{:-<60}", "");
        for item in hits {
            print_row(item);
        }
        Ok(())
    }

    pub async fn cmd_info(&self, name: &str, summary: bool) -> Result<()> {
        let record = self.registry.fetch_one(name, !summary, &self.cancel).await?;
        let enabled = self.reconciler.store().load_or_default().await?.is_enabled(name);

        println!("Mod Information");
        println!("{:-<40}", "");
        println!("Name:       {}", record.name);
        println!("Title:      {}", record.display_title());
        println!("Owner:      {}", record.owner);
        println!("Downloads:  {}", record.downloads_count);
        println!("Score:      {:.2}", record.score);
        if let Some(category) = record.category.as_deref().filter(|c| !c.is_empty()) {
            println!("Category:   {}", category);
        }
        println!("Enabled:    {}", if enabled { "yes" } else { "no" });
        if record.deprecated {
            println!("Deprecated: yes");
        }
        if let Some(license) = &record.license {
            println!("License:    {}", license.title);
        }
        if let Some(homepage) = record.homepage.as_deref().filter(|h| !h.is_empty()) {
            println!("Homepage:   {}", homepage);
        }
        if !record.summary.is_empty() {
            println!("\n{}", record.summary);
        }

        let release = record.latest_release();
        if release.is_empty() {
            println!("\nNo releases.");
            return Ok(());
        }

        println!("\nLatest release: {} ({})", release.version, release.file_name);
        if !release.info_json.factorio_version.is_empty() {
            println!("  Factorio: {}", release.info_json.factorio_version);
        }
        if let Some(at) = release.released_at {
            println!("  Released: {}", at.format("%Y-%m-%d"));
        }

        let deps = release.dependencies();
        if !deps.is_empty() {
            println!("  Dependencies:");
            for dep in deps {
                println!("    {}", dep);
            }
        }

        if !summary && record.releases.len() > 1 {
            println!("\nReleases: {}", record.releases.len());
        }
        Ok(())
    }

    // ========== Enablement Commands ==========

    pub async fn cmd_toggle(&self, name: &str) -> Result<()> {
        let mut catalog = self.catalog_containing(name).await?;
        let outcome = self.reconciler.toggle_enable(&mut catalog, name).await?;
        println!("{}", outcome.message);
        Ok(())
    }

    pub async fn cmd_enable(&self, name: &str) -> Result<()> {
        self.cmd_set_enabled(name, true).await
    }

    pub async fn cmd_disable(&self, name: &str) -> Result<()> {
        self.cmd_set_enabled(name, false).await
    }

    async fn cmd_set_enabled(&self, name: &str, enabled: bool) -> Result<()> {
        let mut catalog = self.catalog_containing(name).await?;
        let outcome = self.reconciler.set_enabled(&mut catalog, name, enabled).await?;
        println!("{}", outcome.message);
        Ok(())
    }

    // ========== Archive Commands ==========

    pub async fn cmd_download(&self) -> Result<()> {
        let settings = self.config.server_settings_file();
        let credentials = ServerCredentials::load(&settings)
            .await
            .with_context(|| format!("Failed to load credentials from {}", settings.display()))?;

        let catalog = self.local_catalog().await?;
        let enabled = catalog.enabled().count();
        if enabled == 0 {
            println!("No enabled mods to download.");
            return Ok(());
        }

        let mut downloader = Downloader::new(
            Arc::new(self.registry.clone()),
            self.config.download.max_concurrent,
            self.config.download.verify_sha1,
        );
        if self.config.download.include_dependencies {
            downloader = downloader.with_dependencies(DependencyResolver::new(
                Arc::new(self.registry.clone()),
                self.config.registry.factorio_version,
            ));
        }
        let target = self.config.mods_dir();

        println!("Downloading {} mod(s) to {}...", enabled, target.display());
        let report = downloader
            .download_enabled(&catalog, &target, &credentials, &self.cancel)
            .await?;

        println!("{:-<60}", "");
        for item in &report.items {
            match &item.outcome {
                DownloadOutcome::Downloaded { bytes } => match &item.required_by {
                    Some(parent) => println!(
                        "  [ok]   {} ({} bytes, needed by {})",
                        item.file_name, bytes, parent
                    ),
                    None => println!("  [ok]   {} ({} bytes)", item.file_name, bytes),
                },
                DownloadOutcome::Skipped { reason } => println!("  [skip] {} ({})", item.name, reason),
                DownloadOutcome::Failed(e) => println!("  [fail] {}: {}", item.name, e),
            }
        }
        println!(
            "\n{} downloaded, {} skipped, {} failed",
            report.downloaded(),
            report.skipped(),
            report.failed()
        );

        if report.has_failures() {
            bail!("{} download(s) failed", report.failed());
        }
        Ok(())
    }

    pub async fn cmd_remove(&self, name: &str) -> Result<()> {
        let target = self.config.mods_dir();
        let removed = remove_archives(&target, name).await?;

        if removed.is_empty() {
            println!("No archives for '{}' in {}", name, target.display());
        } else {
            for path in &removed {
                println!("Removed {}", path.display());
            }
        }
        Ok(())
    }

    // ========== Config Commands ==========

    pub async fn cmd_config_show(&self) -> Result<()> {
        let config = &self.config;
        println!("Configuration");
        println!("{:-<40}", "");
        println!("Config file:      {}", config.paths.config_file().display());
        println!("Registry URL:     {}", config.registry_url);
        println!("Mods dir:         {}", config.mods_dir().display());
        println!("Mod list:         {}", config.mod_list_file().display());
        println!("Server settings:  {}", config.server_settings_file().display());
        println!("Factorio version: {}", config.registry.factorio_version);
        println!("Page size:        {}", config.registry.page_size);
        println!("Hide deprecated:  {}", config.registry.hide_deprecated);
        println!("Request timeout:  {}s", config.registry.request_timeout_secs);
        println!("Max concurrent:   {}", config.download.max_concurrent);
        println!("Verify SHA-1:     {}", config.download.verify_sha1);
        println!("Dependencies:     {}", config.download.include_dependencies);
        Ok(())
    }
}

fn print_row(item: &MergedCatalogItem) {
    let marker = if item.enabled { "[x]" } else { "[ ]" };
    println!(
        "  {} {:<30} {:>10}  {}",
        marker,
        item.name(),
        item.record.downloads_count,
        item.record.display_title()
    );
}
