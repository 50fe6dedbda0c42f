//! Query options for the mod list endpoint

use super::model::ModRecord;
use anyhow::bail;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Factorio versions the portal can filter by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FactorioVersion {
    #[serde(rename = "0.13")]
    V0_13,
    #[serde(rename = "0.14")]
    V0_14,
    #[serde(rename = "0.15")]
    V0_15,
    #[serde(rename = "0.16")]
    V0_16,
    #[serde(rename = "0.17")]
    V0_17,
    #[serde(rename = "0.18")]
    V0_18,
    #[serde(rename = "1.0")]
    V1_0,
    #[default]
    #[serde(rename = "1.1")]
    V1_1,
}

impl FactorioVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            FactorioVersion::V0_13 => "0.13",
            FactorioVersion::V0_14 => "0.14",
            FactorioVersion::V0_15 => "0.15",
            FactorioVersion::V0_16 => "0.16",
            FactorioVersion::V0_17 => "0.17",
            FactorioVersion::V0_18 => "0.18",
            FactorioVersion::V1_0 => "1.0",
            FactorioVersion::V1_1 => "1.1",
        }
    }

    pub fn all() -> &'static [FactorioVersion] {
        &[
            FactorioVersion::V0_13,
            FactorioVersion::V0_14,
            FactorioVersion::V0_15,
            FactorioVersion::V0_16,
            FactorioVersion::V0_17,
            FactorioVersion::V0_18,
            FactorioVersion::V1_0,
            FactorioVersion::V1_1,
        ]
    }

    pub fn from_cli(value: &str) -> anyhow::Result<Self> {
        let value = value.trim();
        match FactorioVersion::all().iter().find(|v| v.as_str() == value) {
            Some(v) => Ok(*v),
            None => bail!(
                "Unknown Factorio version '{}'. Valid: 0.13, 0.14, 0.15, 0.16, 0.17, 0.18, 1.0, 1.1",
                value
            ),
        }
    }
}

impl fmt::Display for FactorioVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Page size sent as `page_size`: a positive count or `max` for everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSize {
    Count(u32),
    Max,
}

impl Default for PageSize {
    fn default() -> Self {
        PageSize::Count(20)
    }
}

impl PageSize {
    pub fn from_cli(value: &str) -> anyhow::Result<Self> {
        let value = value.trim();
        if value.eq_ignore_ascii_case("max") {
            return Ok(PageSize::Max);
        }
        match value.parse::<u32>() {
            Ok(n) if n > 0 => Ok(PageSize::Count(n)),
            _ => bail!("Invalid page size '{}'. Use a positive number or 'max'", value),
        }
    }
}

impl fmt::Display for PageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageSize::Count(n) => write!(f, "{}", n),
            PageSize::Max => f.write_str("max"),
        }
    }
}

/// Client-side ordering applied to every fetched page.
#[derive(Clone, Copy, Default)]
pub enum SortBy {
    #[default]
    DownloadsDesc,
    NameAsc,
    ScoreDesc,
    UpdatedDesc,
    CreatedDesc,
    Custom(fn(&ModRecord, &ModRecord) -> Ordering),
}

impl fmt::Debug for SortBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortBy::DownloadsDesc => f.write_str("DownloadsDesc"),
            SortBy::NameAsc => f.write_str("NameAsc"),
            SortBy::ScoreDesc => f.write_str("ScoreDesc"),
            SortBy::UpdatedDesc => f.write_str("UpdatedDesc"),
            SortBy::CreatedDesc => f.write_str("CreatedDesc"),
            SortBy::Custom(_) => f.write_str("Custom"),
        }
    }
}

impl SortBy {
    pub fn compare(&self, a: &ModRecord, b: &ModRecord) -> Ordering {
        match self {
            SortBy::DownloadsDesc => b.downloads_count.cmp(&a.downloads_count),
            SortBy::NameAsc => a.name.cmp(&b.name),
            SortBy::ScoreDesc => b.score.total_cmp(&a.score),
            SortBy::UpdatedDesc => b.updated_at.cmp(&a.updated_at),
            SortBy::CreatedDesc => b.created_at.cmp(&a.created_at),
            SortBy::Custom(cmp) => cmp(a, b),
        }
    }

    /// Stable sort, so re-sorting an already sorted page is a no-op.
    pub fn sort(&self, mods: &mut [ModRecord]) {
        mods.sort_by(|a, b| self.compare(a, b));
    }

    pub fn from_cli(value: &str) -> anyhow::Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "downloads" => Ok(SortBy::DownloadsDesc),
            "name" => Ok(SortBy::NameAsc),
            "score" => Ok(SortBy::ScoreDesc),
            "updated" => Ok(SortBy::UpdatedDesc),
            "created" => Ok(SortBy::CreatedDesc),
            other => bail!(
                "Unknown sort '{}'. Valid: downloads, name, score, updated, created",
                other
            ),
        }
    }
}

/// Options for a `/api/mods` request.
#[derive(Debug, Clone)]
pub struct PageOptions {
    pub hide_deprecated: bool,
    /// 0-based.
    pub page: u32,
    pub page_size: PageSize,
    pub version: FactorioVersion,
    /// Restrict the result to these exact names.
    pub name_list: Option<Vec<String>>,
    pub sort_by: SortBy,
}

impl Default for PageOptions {
    fn default() -> Self {
        Self {
            hide_deprecated: true,
            page: 0,
            page_size: PageSize::default(),
            version: FactorioVersion::default(),
            name_list: None,
            sort_by: SortBy::default(),
        }
    }
}

impl PageOptions {
    /// Options that fetch every mod named in `names` in one request.
    pub fn for_names(names: Vec<String>) -> Self {
        Self {
            page_size: PageSize::Max,
            name_list: Some(names),
            ..Default::default()
        }
    }

    /// Query parameters in the order they are sent.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("hide_deprecated", self.hide_deprecated.to_string()),
            ("page", self.page.to_string()),
            ("page_size", self.page_size.to_string()),
            ("version", self.version.as_str().to_string()),
        ];
        if let Some(names) = &self.name_list {
            for name in names {
                pairs.push(("namelist", name.clone()));
            }
        }
        pairs
    }
}
