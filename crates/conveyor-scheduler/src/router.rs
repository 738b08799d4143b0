//! Routing decisions: which queue receives a build's job.

use conveyor_core::build::Build;
use conveyor_core::repository::Repository;

use crate::registry::{Queue, QueueEntry, QueueRegistry};

/// Pick the queue for a build.
///
/// Entries are consulted in declaration order and the first match wins: an
/// entry matches when its slug equals the owning repository's slug, or when
/// the build's `config.target` is set and equals the entry's target. When
/// nothing matches the default queue is returned; routing never fails.
pub fn worker_for(registry: &QueueRegistry, repository: &Repository, build: &Build) -> Queue {
    registry
        .entries()
        .into_iter()
        .find(|entry| use_queue(entry, repository, build))
        .map(|entry| entry.queue)
        .unwrap_or_default()
}

fn use_queue(entry: &QueueEntry, repository: &Repository, build: &Build) -> bool {
    let slug_match = entry
        .slug
        .as_deref()
        .is_some_and(|slug| repository.slug() == slug);
    let target_match = match (build.config.target(), entry.target.as_deref()) {
        (Some(target), Some(entry_target)) => target == entry_target,
        _ => false,
    };
    slug_match || target_match
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use conveyor_config::QueueSpec;
    use conveyor_core::ResourceId;
    use conveyor_core::build::NewBuild;
    use serde_json::json;

    fn repository(owner: &str, name: &str) -> Repository {
        Repository {
            id: ResourceId::new(),
            owner: owner.to_string(),
            name: name.to_string(),
            created_at: Utc::now(),
        }
    }

    fn build_with_config(config: serde_json::Value) -> Build {
        Build::create(
            NewBuild {
                repository_id: Some(ResourceId::new()),
                commit_id: Some(ResourceId::new()),
                request_id: Some(ResourceId::new()),
                config,
            },
            1,
            Utc::now(),
        )
        .unwrap()
    }

    fn spec(queue: &str, slug: Option<&str>, target: Option<&str>) -> QueueSpec {
        QueueSpec {
            queue: queue.to_string(),
            slug: slug.map(String::from),
            target: target.map(String::from),
        }
    }

    #[test]
    fn test_first_matching_entry_wins() {
        // Both entries match; declaration order decides.
        let registry = QueueRegistry::from_config(&[
            spec("q1", Some("a/b"), None),
            spec("q2", None, Some("x")),
        ]);
        let repo = repository("a", "b");
        let build = build_with_config(json!({ "target": "x" }));

        assert_eq!(worker_for(&registry, &repo, &build).name(), "q1");
    }

    #[test]
    fn test_routes_by_slug() {
        let registry = QueueRegistry::from_config(&[spec("rails", Some("rails/rails"), None)]);
        let build = build_with_config(json!({}));

        let queue = worker_for(&registry, &repository("rails", "rails"), &build);
        assert_eq!(queue.name(), "rails");

        let queue = worker_for(&registry, &repository("other", "repo"), &build);
        assert_eq!(queue.name(), "builds");
    }

    #[test]
    fn test_routes_by_config_target() {
        let registry = QueueRegistry::from_config(&[spec("macos", None, Some("macos"))]);
        let repo = repository("any", "repo");

        let matching = build_with_config(json!({ "target": "macos" }));
        assert_eq!(worker_for(&registry, &repo, &matching).name(), "macos");

        let unset = build_with_config(json!({}));
        assert_eq!(worker_for(&registry, &repo, &unset).name(), "builds");

        let different = build_with_config(json!({ "target": "linux" }));
        assert_eq!(worker_for(&registry, &repo, &different).name(), "builds");
    }

    #[test]
    fn test_empty_registry_falls_back_to_default() {
        let registry = QueueRegistry::new();
        let build = build_with_config(json!({ "target": "x" }));

        let queue = worker_for(&registry, &repository("a", "b"), &build);
        assert_eq!(queue.name(), "builds");
    }

    #[test]
    fn test_entry_without_predicates_never_matches() {
        let registry = QueueRegistry::from_config(&[
            spec("dead", None, None),
            spec("live", Some("a/b"), None),
        ]);
        let build = build_with_config(json!({}));

        let queue = worker_for(&registry, &repository("a", "b"), &build);
        assert_eq!(queue.name(), "live");
    }
}
