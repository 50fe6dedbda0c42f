//! Required-dependency resolution for download batches
//!
//! Starting from the releases already queued, walks required (and `~`)
//! dependencies through the registry and picks, for each missing mod, the
//! newest release that satisfies the version requirement and targets the
//! configured Factorio version. `base`, optional and incompatible entries are
//! never followed.

use crate::error::{Result, SyncError};
use crate::registry::{Dependency, FactorioVersion, ModRegistry, ReleaseRecord};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A dependency release selected for download.
#[derive(Debug, Clone)]
pub struct ResolvedRelease {
    pub name: String,
    pub release: ReleaseRecord,
    /// The queued mod whose release asked for this one.
    pub required_by: String,
}

/// A dependency that could not be satisfied.
#[derive(Debug)]
pub struct UnresolvedDependency {
    pub name: String,
    pub required_by: String,
    pub error: SyncError,
}

#[derive(Debug, Default)]
pub struct Resolution {
    pub releases: Vec<ResolvedRelease>,
    pub unresolved: Vec<UnresolvedDependency>,
}

pub struct DependencyResolver {
    registry: Arc<dyn ModRegistry>,
    factorio_version: FactorioVersion,
}

impl DependencyResolver {
    pub fn new(registry: Arc<dyn ModRegistry>, factorio_version: FactorioVersion) -> Self {
        Self {
            registry,
            factorio_version,
        }
    }

    /// Resolve the required dependencies of `roots` (name, release pairs).
    ///
    /// Roots are never re-fetched; a dependency on a root only checks that the
    /// queued release satisfies the requirement. Per-dependency failures are
    /// collected; only cancellation aborts the walk.
    pub async fn resolve(
        &self,
        roots: &[(String, ReleaseRecord)],
        cancel: &CancellationToken,
    ) -> Result<Resolution> {
        // name -> selected version; None once a dependency failed to resolve
        let mut selected: HashMap<String, Option<String>> = roots
            .iter()
            .map(|(name, release)| (name.clone(), Some(release.version.clone())))
            .collect();
        let mut queue: VecDeque<(Dependency, String)> = VecDeque::new();
        for (name, release) in roots {
            enqueue_required(&mut queue, release, name);
        }

        let mut resolution = Resolution::default();

        while let Some((dep, required_by)) = queue.pop_front() {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            if let Some(entry) = selected.get(&dep.name) {
                let conflict = match (entry, dep.requirement.as_ref()) {
                    (Some(version), Some(req)) if !req.matches(version) => Some((version, req)),
                    _ => None,
                };
                if let Some((version, req)) = conflict {
                    resolution.unresolved.push(UnresolvedDependency {
                        error: SyncError::download(
                            &dep.name,
                            format!(
                                "{} needs {} {} {}, but {} is queued",
                                required_by,
                                dep.name,
                                req.op.as_str(),
                                req.version,
                                version
                            ),
                        ),
                        name: dep.name,
                        required_by,
                    });
                }
                continue;
            }

            let record = match self.registry.fetch_one(&dep.name, true, cancel).await {
                Ok(record) => record,
                Err(SyncError::Cancelled) => return Err(SyncError::Cancelled),
                Err(e) => {
                    tracing::warn!("Cannot resolve {} (needed by {}): {}", dep.name, required_by, e);
                    // Mark as visited so siblings depending on it do not refetch.
                    selected.insert(dep.name.clone(), None);
                    resolution.unresolved.push(UnresolvedDependency {
                        name: dep.name,
                        required_by,
                        error: e,
                    });
                    continue;
                }
            };

            let Some(release) = self.pick_release(&dep, &record.releases, record.latest_release()) else {
                let wanted = dep
                    .requirement
                    .as_ref()
                    .map(|req| format!(" {} {}", req.op.as_str(), req.version))
                    .unwrap_or_default();
                selected.insert(dep.name.clone(), None);
                resolution.unresolved.push(UnresolvedDependency {
                    error: SyncError::download(
                        &dep.name,
                        format!(
                            "no release{} for Factorio {} (needed by {})",
                            wanted, self.factorio_version, required_by
                        ),
                    ),
                    name: dep.name,
                    required_by,
                });
                continue;
            };

            tracing::debug!(
                "Resolved {} {} (needed by {})",
                dep.name,
                release.version,
                required_by
            );
            selected.insert(dep.name.clone(), Some(release.version.clone()));
            enqueue_required(&mut queue, &release, &dep.name);
            resolution.releases.push(ResolvedRelease {
                name: dep.name,
                release,
                required_by,
            });
        }

        Ok(resolution)
    }

    /// Newest release, scanning from the end, that fits the requirement and game version.
    fn pick_release(
        &self,
        dep: &Dependency,
        releases: &[ReleaseRecord],
        latest: &ReleaseRecord,
    ) -> Option<ReleaseRecord> {
        let fits = |release: &ReleaseRecord| {
            let game = &release.info_json.factorio_version;
            !release.is_empty()
                && (game.is_empty() || game == self.factorio_version.as_str())
                && dep
                    .requirement
                    .as_ref()
                    .map(|req| req.matches(&release.version))
                    .unwrap_or(true)
        };

        if releases.is_empty() {
            return Some(latest).filter(|r| fits(*r)).cloned();
        }
        releases.iter().rev().find(|r| fits(*r)).cloned()
    }
}

fn enqueue_required(queue: &mut VecDeque<(Dependency, String)>, release: &ReleaseRecord, owner: &str) {
    for dep in release.dependencies() {
        if dep.kind.is_required() && !dep.is_base_game() {
            queue.push_back((dep, owner.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{InfoJson, MockModRegistry, ModRecord};

    fn release(name: &str, version: &str, deps: &[&str]) -> ReleaseRecord {
        ReleaseRecord {
            version: version.to_string(),
            download_url: format!("/download/{}/{}", name, version),
            file_name: format!("{}_{}.zip", name, version),
            info_json: InfoJson {
                factorio_version: "1.1".to_string(),
                dependencies: deps.iter().map(|d| d.to_string()).collect(),
            },
            ..Default::default()
        }
    }

    fn registry_of(records: Vec<ModRecord>) -> MockModRegistry {
        let by_name: HashMap<String, ModRecord> =
            records.into_iter().map(|r| (r.name.clone(), r)).collect();
        let mut registry = MockModRegistry::new();
        registry.expect_fetch_one().returning(move |name, _, _| {
            by_name
                .get(name)
                .cloned()
                .ok_or_else(|| SyncError::NotFound(name.to_string()))
        });
        registry
    }

    fn record(name: &str, releases: Vec<ReleaseRecord>) -> ModRecord {
        ModRecord {
            name: name.to_string(),
            releases,
            ..Default::default()
        }
    }

    fn resolver(registry: MockModRegistry) -> DependencyResolver {
        DependencyResolver::new(Arc::new(registry), FactorioVersion::V1_1)
    }

    fn names(resolution: &Resolution) -> Vec<&str> {
        resolution.releases.iter().map(|r| r.name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_resolves_transitive_chain() {
        let registry = registry_of(vec![
            record(
                "boblibrary",
                vec![
                    release("boblibrary", "1.0.0", &["base"]),
                    release("boblibrary", "1.1.5", &["base >= 1.1.0", "bobcore"]),
                ],
            ),
            record("bobcore", vec![release("bobcore", "0.1.0", &["? bobextras"])]),
        ]);
        let roots = vec![(
            "bobplates".to_string(),
            release("bobplates", "1.1.5", &["base", "boblibrary >= 1.1.0", "? bobores"]),
        )];

        let resolution = resolver(registry)
            .resolve(&roots, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(names(&resolution), vec!["boblibrary", "bobcore"]);
        assert_eq!(resolution.releases[0].release.version, "1.1.5");
        assert_eq!(resolution.releases[0].required_by, "bobplates");
        assert_eq!(resolution.releases[1].required_by, "boblibrary");
        assert!(resolution.unresolved.is_empty());
    }

    #[tokio::test]
    async fn test_cycle_is_visited_once() {
        let mut registry = MockModRegistry::new();
        registry
            .expect_fetch_one()
            .withf(|name, _, _| name == "b")
            .times(1)
            .returning(|_, _, _| Ok(record("b", vec![release("b", "1.0.0", &["a"])])));
        let roots = vec![("a".to_string(), release("a", "1.0.0", &["b"]))];

        let resolution = resolver(registry)
            .resolve(&roots, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(names(&resolution), vec!["b"]);
        assert!(resolution.unresolved.is_empty());
    }

    #[tokio::test]
    async fn test_unsatisfiable_requirement_is_reported() {
        let registry = registry_of(vec![record(
            "boblibrary",
            vec![release("boblibrary", "1.0.0", &[]), release("boblibrary", "1.1.0", &[])],
        )]);
        let roots = vec![(
            "bobplates".to_string(),
            release("bobplates", "2.0.0", &["boblibrary >= 2.0.0"]),
        )];

        let resolution = resolver(registry)
            .resolve(&roots, &CancellationToken::new())
            .await
            .unwrap();

        assert!(resolution.releases.is_empty());
        assert_eq!(resolution.unresolved.len(), 1);
        assert_eq!(resolution.unresolved[0].name, "boblibrary");
        assert!(matches!(resolution.unresolved[0].error, SyncError::Download { .. }));
    }

    #[tokio::test]
    async fn test_picks_newest_release_for_game_version() {
        let mut newer = release("lib", "2.0.0", &[]);
        newer.info_json.factorio_version = "2.0".to_string();
        let registry = registry_of(vec![record(
            "lib",
            vec![release("lib", "1.0.0", &[]), release("lib", "1.2.0", &[]), newer],
        )]);
        let roots = vec![("app".to_string(), release("app", "1.0.0", &["lib"]))];

        let resolution = resolver(registry)
            .resolve(&roots, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(resolution.releases[0].release.version, "1.2.0");
    }

    #[tokio::test]
    async fn test_missing_dependency_does_not_stop_siblings() {
        let registry = registry_of(vec![record("present", vec![release("present", "1.0.0", &[])])]);
        let roots = vec![("app".to_string(), release("app", "1.0.0", &["ghost", "~ present"]))];

        let resolution = resolver(registry)
            .resolve(&roots, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(names(&resolution), vec!["present"]);
        assert!(matches!(resolution.unresolved[0].error, SyncError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_dependency_on_queued_root_checks_version() {
        let roots = vec![
            ("a".to_string(), release("a", "1.0.0", &["b >= 2.0.0"])),
            ("b".to_string(), release("b", "1.5.0", &[])),
        ];

        let resolution = resolver(MockModRegistry::new())
            .resolve(&roots, &CancellationToken::new())
            .await
            .unwrap();

        assert!(resolution.releases.is_empty());
        assert_eq!(resolution.unresolved[0].name, "b");
        assert_eq!(resolution.unresolved[0].required_by, "a");
    }
}
