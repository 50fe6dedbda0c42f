//! Mod portal data model

use super::dependency::Dependency;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Returned by `ModRecord::latest_release` when a mod has no releases at all.
static EMPTY_RELEASE: ReleaseRecord = ReleaseRecord {
    version: String::new(),
    download_url: String::new(),
    file_name: String::new(),
    sha1: String::new(),
    released_at: None,
    info_json: InfoJson {
        factorio_version: String::new(),
        dependencies: Vec::new(),
    },
};

/// A mod as published on the portal.
///
/// Summary responses (`/api/mods`, `/api/mods/{name}`) only fill a subset of
/// the fields; `/api/mods/{name}/full` adds the long-form text and the full
/// release history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModRecord {
    pub name: String,
    pub title: String,
    pub owner: String,
    pub summary: String,
    pub downloads_count: u64,
    pub score: f64,
    pub category: Option<String>,
    pub tag: Option<Tag>,
    pub description: Option<String>,
    pub changelog: Option<String>,
    pub faq: Option<String>,
    pub homepage: Option<String>,
    pub github_path: Option<String>,
    pub source_url: Option<String>,
    pub thumbnail: Option<String>,
    pub license: Option<License>,
    pub images: Vec<ModImage>,
    pub deprecated: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Oldest to newest, in registry order.
    pub releases: Vec<ReleaseRecord>,
    pub latest_release: Option<ReleaseRecord>,
}

impl ModRecord {
    /// The explicit latest release, else the last listed release, else an empty release.
    pub fn latest_release(&self) -> &ReleaseRecord {
        self.latest_release
            .as_ref()
            .or_else(|| self.releases.last())
            .unwrap_or(&EMPTY_RELEASE)
    }

    /// Display title, falling back to the internal name.
    pub fn display_title(&self) -> &str {
        if self.title.trim().is_empty() {
            &self.name
        } else {
            &self.title
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReleaseRecord {
    pub version: String,
    /// Portal-relative path; needs the registry base URL and credentials to be fetched.
    pub download_url: String,
    pub file_name: String,
    pub sha1: String,
    pub released_at: Option<DateTime<Utc>>,
    pub info_json: InfoJson,
}

impl ReleaseRecord {
    /// True for the zero value handed out when a mod has no releases.
    pub fn is_empty(&self) -> bool {
        self.file_name.is_empty() && self.download_url.is_empty()
    }

    /// Parsed dependency list. Entries that do not parse are skipped.
    pub fn dependencies(&self) -> Vec<Dependency> {
        self.info_json
            .dependencies
            .iter()
            .filter_map(|raw| match raw.parse::<Dependency>() {
                Ok(dep) => Some(dep),
                Err(e) => {
                    tracing::debug!("Skipping dependency '{}': {}", raw, e);
                    None
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InfoJson {
    pub factorio_version: String,
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tag {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct License {
    pub id: String,
    pub name: String,
    pub title: String,
    pub description: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModImage {
    pub id: String,
    pub thumbnail: String,
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release(version: &str) -> ReleaseRecord {
        ReleaseRecord {
            version: version.to_string(),
            file_name: format!("bobplates_{}.zip", version),
            download_url: format!("/download/bobplates/{}", version),
            ..Default::default()
        }
    }

    #[test]
    fn test_latest_release_prefers_explicit_pointer() {
        let record = ModRecord {
            name: "bobplates".to_string(),
            releases: vec![release("1.0.0"), release("1.1.0")],
            latest_release: Some(release("1.1.5")),
            ..Default::default()
        };
        assert_eq!(record.latest_release().version, "1.1.5");
    }

    #[test]
    fn test_latest_release_falls_back_to_last_release() {
        let record = ModRecord {
            name: "bobplates".to_string(),
            releases: vec![release("1.0.0"), release("1.1.0")],
            ..Default::default()
        };
        assert_eq!(record.latest_release().version, "1.1.0");
    }

    #[test]
    fn test_latest_release_without_releases_is_empty() {
        let record = ModRecord {
            name: "bobplates".to_string(),
            ..Default::default()
        };
        let latest = record.latest_release();
        assert!(latest.is_empty());
        assert_eq!(latest, &ReleaseRecord::default());
    }

    #[test]
    fn test_decode_summary_record_with_nulls() {
        let json = r#"{
            "name": "angelsrefining",
            "title": "Angel's Refining",
            "owner": "Arch666Angel",
            "summary": "Ores, refining",
            "downloads_count": 1250000,
            "score": 12.5,
            "category": null,
            "thumbnail": "/assets/thumb.png",
            "latest_release": {
                "download_url": "/download/angelsrefining/5f1",
                "file_name": "angelsrefining_0.12.5.zip",
                "info_json": {"factorio_version": "1.1"},
                "released_at": "2023-03-01T10:20:30.123000Z",
                "version": "0.12.5",
                "sha1": "abc"
            }
        }"#;
        let record: ModRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.downloads_count, 1_250_000);
        assert!(record.category.is_none());
        assert!(record.releases.is_empty());
        let latest = record.latest_release();
        assert_eq!(latest.file_name, "angelsrefining_0.12.5.zip");
        assert_eq!(latest.info_json.factorio_version, "1.1");
        assert!(latest.info_json.dependencies.is_empty());
        assert!(latest.released_at.is_some());
    }

    #[test]
    fn test_release_dependencies_skip_malformed() {
        let release = ReleaseRecord {
            info_json: InfoJson {
                factorio_version: "1.1".to_string(),
                dependencies: vec![
                    "base >= 1.1.0".to_string(),
                    "? bobores".to_string(),
                    "".to_string(),
                ],
            },
            ..Default::default()
        };
        let deps = release.dependencies();
        assert_eq!(deps.len(), 2);
        assert_eq!(deps[0].name, "base");
        assert_eq!(deps[1].name, "bobores");
    }

    #[test]
    fn test_display_title_falls_back_to_name() {
        let record = ModRecord {
            name: "bobplates".to_string(),
            title: "  ".to_string(),
            ..Default::default()
        };
        assert_eq!(record.display_title(), "bobplates");
    }
}
