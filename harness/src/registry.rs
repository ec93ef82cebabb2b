//! npm registry client: version-selector resolution.

use anyhow::Context;
use migrate_core::{Error, ResolvedTool, Result};
use serde::Deserialize;
use std::collections::HashMap;

/// Registry metadata document for one package.
///
/// Only the fields the resolver consumes are modeled; the registry sends far
/// more.
#[derive(Debug, Deserialize)]
pub struct RegistryMetadata {
    #[serde(rename = "dist-tags")]
    pub dist_tags: HashMap<String, String>,
    pub versions: HashMap<String, VersionEntry>,
}

#[derive(Debug, Deserialize)]
pub struct VersionEntry {
    pub dist: DistEntry,
}

#[derive(Debug, Deserialize)]
pub struct DistEntry {
    pub tarball: String,
}

#[derive(Clone)]
pub struct RegistryClient {
    http: reqwest::Client,
    base_url: String,
}

impl RegistryClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Resolve a version selector to a concrete version and tarball URL.
    ///
    /// Exactly one metadata fetch per call, regardless of which branch the
    /// selector takes.
    pub async fn resolve(&self, package: &str, selector: &str) -> Result<ResolvedTool> {
        let meta = self.fetch_metadata(package).await?;
        select_version(&meta, selector)
    }

    async fn fetch_metadata(&self, package: &str) -> Result<RegistryMetadata> {
        self.fetch_metadata_inner(package)
            .await
            .map_err(Error::Registry)
    }

    async fn fetch_metadata_inner(&self, package: &str) -> anyhow::Result<RegistryMetadata> {
        let url = format!("{}/{package}", self.base_url);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;
        let resp = resp.error_for_status().context("registry metadata status")?;
        resp.json::<RegistryMetadata>()
            .await
            .context("decode registry metadata")
    }
}

/// Pick a concrete version for `selector` out of a metadata document.
///
/// Empty and "latest" follow the `latest` dist-tag; an exact known version
/// wins over a dist-tag of the same name; anything else is looked up as a
/// dist-tag.
pub fn select_version(meta: &RegistryMetadata, selector: &str) -> Result<ResolvedTool> {
    let selector = selector.trim();

    let version: &str = if selector.is_empty() || selector == "latest" {
        meta.dist_tags
            .get("latest")
            .map(String::as_str)
            .ok_or_else(|| Error::VersionNotFound {
                selector: "latest".to_string(),
            })?
    } else if meta.versions.contains_key(selector) {
        selector
    } else {
        meta.dist_tags
            .get(selector)
            .map(String::as_str)
            .ok_or_else(|| Error::VersionNotFound {
                selector: selector.to_string(),
            })?
    };

    let entry = meta
        .versions
        .get(version)
        .ok_or_else(|| Error::VersionNotFound {
            selector: version.to_string(),
        })?;

    Ok(ResolvedTool {
        version: version.to_string(),
        tarball_url: entry.dist.tarball.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> RegistryMetadata {
        serde_json::from_value(serde_json::json!({
            "dist-tags": {
                "latest": "5.12.0",
                "stable": "5.10.0",
                "dangling": "9.9.9"
            },
            "versions": {
                "5.10.0": { "dist": { "tarball": "https://registry.example/prisma-5.10.0.tgz" } },
                "5.12.0": { "dist": { "tarball": "https://registry.example/prisma-5.12.0.tgz" } }
            }
        }))
        .unwrap()
    }

    #[test]
    fn exact_version_resolves_without_consulting_tags() {
        let resolved = select_version(&metadata(), "5.10.0").unwrap();
        assert_eq!(resolved.version, "5.10.0");
        assert_eq!(
            resolved.tarball_url,
            "https://registry.example/prisma-5.10.0.tgz"
        );
    }

    #[test]
    fn dist_tag_resolves_via_tag_mapping() {
        let resolved = select_version(&metadata(), "stable").unwrap();
        assert_eq!(resolved.version, "5.10.0");
    }

    #[test]
    fn empty_and_latest_follow_the_latest_tag() {
        for selector in ["", "latest"] {
            let resolved = select_version(&metadata(), selector).unwrap();
            assert_eq!(resolved.version, "5.12.0");
        }
    }

    #[test]
    fn unknown_selector_is_version_not_found() {
        let err = select_version(&metadata(), "no-such-thing").unwrap_err();
        assert!(matches!(
            err,
            Error::VersionNotFound { selector } if selector == "no-such-thing"
        ));
    }

    #[test]
    fn tag_pointing_at_unknown_version_is_version_not_found() {
        let err = select_version(&metadata(), "dangling").unwrap_err();
        assert!(matches!(err, Error::VersionNotFound { .. }));
    }
}
