//! Download-once tool cache.
//!
//! `ToolCache` turns a resolved version into a ready-to-execute entry point,
//! downloading and extracting the tarball at most once per version. The
//! persistent store is behind the `CacheStore` trait so tests can point it at
//! a throwaway directory; `FsCacheStore` is the production store.

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use flate2::read::GzDecoder;
use migrate_core::{CacheStore, Error, ResolvedTool, Result};
use std::path::{Path, PathBuf};
use tar::Archive;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;

use crate::constants::TOOL_ENTRYPOINT;

pub struct ToolCache<S> {
    store: S,
    http: reqwest::Client,
    tool: String,
}

impl<S: CacheStore> ToolCache<S> {
    pub fn new(tool: impl Into<String>, store: S) -> Self {
        Self {
            store,
            http: reqwest::Client::new(),
            tool: tool.into(),
        }
    }

    /// Return the executable entry point for the resolved tool version.
    ///
    /// A cache hit performs no network or archive work. A miss downloads the
    /// tarball to a staging directory, extracts it there, then publishes the
    /// extracted tree into the store with a single rename.
    pub async fn ensure(&self, resolved: &ResolvedTool) -> Result<PathBuf> {
        if let Some(root) = self.store.lookup(&self.tool, &resolved.version).await? {
            tracing::info!(
                event = "harness.toolcache.hit",
                tool = %self.tool,
                version = %resolved.version,
                "tool cache hit"
            );
            return entry_path(&root);
        }

        tracing::info!(
            event = "harness.toolcache.miss",
            tool = %self.tool,
            version = %resolved.version,
            url = %resolved.tarball_url,
            "downloading tool archive"
        );

        let staging = TempDir::new_in(self.store.staging_root().await?)
            .context("create tool staging dir")
            .map_err(Error::Other)?;

        let archive_path = staging.path().join("tool.tgz");
        self.download(&resolved.tarball_url, &archive_path)
            .await
            .map_err(Error::Download)?;

        let extracted = staging.path().join("extracted");
        tokio::fs::create_dir_all(&extracted)
            .await
            .context("create extraction dir")
            .map_err(Error::Other)?;

        let archive_for_task = archive_path.clone();
        let extracted_for_task = extracted.clone();
        tokio::task::spawn_blocking(move || extract_tar_gz(&archive_for_task, &extracted_for_task))
            .await
            .context("join extraction task")
            .map_err(Error::Other)?
            .map_err(Error::Extraction)?;

        let root = self
            .store
            .publish(&self.tool, &resolved.version, &extracted)
            .await?;
        entry_path(&root)
    }

    async fn download(&self, url: &str, dest: &Path) -> anyhow::Result<()> {
        if let Some(path) = url.strip_prefix("file://") {
            tokio::fs::copy(path, dest)
                .await
                .with_context(|| format!("copy tool archive {path}"))?;
            return Ok(());
        }

        let resp = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;
        let mut resp = resp.error_for_status().context("tool archive status")?;

        let mut file = tokio::fs::File::create(dest)
            .await
            .with_context(|| format!("create archive file {}", dest.display()))?;
        while let Some(chunk) = resp.chunk().await.context("read archive chunk")? {
            file.write_all(&chunk).await.context("write archive chunk")?;
        }
        file.flush().await.context("flush archive")?;
        Ok(())
    }
}

fn entry_path(root: &Path) -> Result<PathBuf> {
    let entry = root.join(TOOL_ENTRYPOINT);
    if !entry.is_file() {
        return Err(Error::EntryMissing { path: entry });
    }
    Ok(entry)
}

fn extract_tar_gz(archive: &Path, dest: &Path) -> anyhow::Result<()> {
    let file = std::fs::File::open(archive)
        .with_context(|| format!("open archive {}", archive.display()))?;
    let decoder = GzDecoder::new(std::io::BufReader::new(file));
    Archive::new(decoder)
        .unpack(dest)
        .context("unpack tool archive")?;
    Ok(())
}

/// Filesystem cache store: `<root>/<tool>/<version>/` per entry.
///
/// Append-only; nothing here evicts. Staged content lives under
/// `<root>/.staging` so publishing is a same-filesystem rename.
pub struct FsCacheStore {
    root: PathBuf,
}

impl FsCacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn entry_dir(&self, tool: &str, version: &str) -> PathBuf {
        self.root.join(tool).join(version)
    }
}

#[async_trait]
impl CacheStore for FsCacheStore {
    async fn lookup(&self, tool: &str, version: &str) -> Result<Option<PathBuf>> {
        let dir = self.entry_dir(tool, version);
        match tokio::fs::metadata(&dir).await {
            Ok(meta) if meta.is_dir() => Ok(Some(dir)),
            Ok(_) => Ok(None),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(Error::Other(anyhow!(err).context(format!(
                "stat cache entry {}",
                dir.display()
            )))),
        }
    }

    async fn publish(&self, tool: &str, version: &str, staged: &Path) -> Result<PathBuf> {
        let dest = self.entry_dir(tool, version);
        let tool_dir = self.root.join(tool);
        tokio::fs::create_dir_all(&tool_dir)
            .await
            .with_context(|| format!("create cache dir {}", tool_dir.display()))
            .map_err(Error::Other)?;

        match tokio::fs::rename(staged, &dest).await {
            Ok(()) => Ok(dest),
            Err(_) if is_populated_dir(&dest).await => {
                // Lost the publish race; the winner's entry is authoritative.
                Ok(dest)
            }
            Err(err) => Err(Error::Other(anyhow!(err).context(format!(
                "publish cache entry {}",
                dest.display()
            )))),
        }
    }

    async fn staging_root(&self) -> Result<PathBuf> {
        let staging = self.root.join(".staging");
        tokio::fs::create_dir_all(&staging)
            .await
            .with_context(|| format!("create staging dir {}", staging.display()))
            .map_err(Error::Other)?;
        Ok(staging)
    }
}

async fn is_populated_dir(path: &Path) -> bool {
    matches!(tokio::fs::metadata(path).await, Ok(meta) if meta.is_dir())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn make_tarball(dir: &Path, name: &str, entries: &[(&str, &str)]) -> PathBuf {
        let path = dir.join(name);
        let file = std::fs::File::create(&path).unwrap();
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(encoder);

        for (entry_path, contents) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            builder
                .append_data(&mut header, entry_path, contents.as_bytes())
                .unwrap();
        }

        builder.into_inner().unwrap().finish().unwrap();
        path
    }

    fn resolved(tarball: &Path) -> ResolvedTool {
        ResolvedTool {
            version: "5.10.0".to_string(),
            tarball_url: format!("file://{}", tarball.display()),
        }
    }

    #[tokio::test]
    async fn ensure_downloads_once_then_short_circuits() {
        let tmp = tempfile::tempdir().unwrap();
        let tarball = make_tarball(
            tmp.path(),
            "prisma.tgz",
            &[(TOOL_ENTRYPOINT, "console.log('cli')\n")],
        );
        let cache = ToolCache::new("prisma", FsCacheStore::new(tmp.path().join("cache")));
        let reference = resolved(&tarball);

        let first = cache.ensure(&reference).await.unwrap();
        assert!(first.is_file());

        // Remove the source archive: a second ensure must not touch it.
        std::fs::remove_file(&tarball).unwrap();

        let second = cache.ensure(&reference).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn ensure_rejects_archive_without_entry_point() {
        let tmp = tempfile::tempdir().unwrap();
        let tarball = make_tarball(
            tmp.path(),
            "empty.tgz",
            &[("package/README.md", "no cli here\n")],
        );
        let cache = ToolCache::new("prisma", FsCacheStore::new(tmp.path().join("cache")));

        let err = cache.ensure(&resolved(&tarball)).await.unwrap_err();
        assert!(matches!(err, Error::EntryMissing { .. }));
    }

    #[tokio::test]
    async fn ensure_surfaces_extraction_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let tarball = tmp.path().join("garbage.tgz");
        let mut file = std::fs::File::create(&tarball).unwrap();
        file.write_all(b"this is not a gzip stream").unwrap();

        let cache = ToolCache::new("prisma", FsCacheStore::new(tmp.path().join("cache")));
        let err = cache.ensure(&resolved(&tarball)).await.unwrap_err();
        assert!(matches!(err, Error::Extraction(_)));
    }

    #[tokio::test]
    async fn ensure_surfaces_download_failure_for_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ToolCache::new("prisma", FsCacheStore::new(tmp.path().join("cache")));
        let reference = ResolvedTool {
            version: "5.10.0".to_string(),
            tarball_url: format!("file://{}/does-not-exist.tgz", tmp.path().display()),
        };

        let err = cache.ensure(&reference).await.unwrap_err();
        assert!(matches!(err, Error::Download(_)));
    }

    #[tokio::test]
    async fn publish_race_keeps_winning_entry() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsCacheStore::new(tmp.path().join("cache"));

        let staged_a = tmp.path().join("a");
        std::fs::create_dir_all(staged_a.join("package")).unwrap();
        std::fs::write(staged_a.join("package/marker"), "a").unwrap();

        let staged_b = tmp.path().join("b");
        std::fs::create_dir_all(staged_b.join("package")).unwrap();
        std::fs::write(staged_b.join("package/marker"), "b").unwrap();

        let winner = store.publish("prisma", "5.10.0", &staged_a).await.unwrap();
        let loser = store.publish("prisma", "5.10.0", &staged_b).await.unwrap();

        assert_eq!(winner, loser);
        let marker = std::fs::read_to_string(winner.join("package/marker")).unwrap();
        assert_eq!(marker, "a");
    }
}
