//! Verify-fetch-verify engine over catalog descriptors.
//!
//! The checksum is the only source of truth: a descriptor succeeds when its
//! target verifies after the fetch step, whatever the fetch itself reported.
//! Failures are caught per descriptor and never stop the run, so re-running
//! only repeats work for targets that are still unverified.

mod archive;
mod gdrive;
mod http;
mod progress;

pub use archive::{extract_member, ArchiveKind};
pub use gdrive::{GoogleDrive, DRIVE_ENDPOINT};
pub use http::download_url;
pub use progress::ProgressMarks;

use crate::catalog::{AssetDescriptor, AssetSource, Catalog};
use crate::checksum;
use crate::config::FetchConfig;
use anyhow::{Context, Result};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Process exit status when at least one asset failed verification.
pub const FAILURE_EXIT_CODE: i32 = 15;

const MIB: f64 = 1024.0 * 1024.0;

/// Pluggable transfer for hosts that need more than a plain GET.
pub trait RemoteFetch: fmt::Debug + Send + Sync {
    /// Writes the remote resource to `dst`; returns the number of bytes written.
    fn fetch_into(&self, dst: &Path, cfg: &FetchConfig) -> Result<u64>;

    /// Short label for listings and logs.
    fn describe(&self) -> String;
}

/// Outcome of one run over a (filtered) catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Targets of every descriptor that was processed, in order.
    pub processed: Vec<PathBuf>,
    /// Number of descriptors excluded by the group filter.
    pub skipped: usize,
    /// Targets whose final verification failed.
    pub failed: Vec<PathBuf>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            FAILURE_EXIT_CODE
        }
    }

    /// Prints the failure list to stdout (nothing on success).
    pub fn print_failures(&self) {
        if self.failed.is_empty() {
            return;
        }
        println!("Following assets have not been downloaded:");
        for path in &self.failed {
            println!("* {}", path.display());
        }
    }
}

/// Runs descriptors against a cache root directory.
#[derive(Debug, Clone)]
pub struct Fetcher {
    root: PathBuf,
    config: FetchConfig,
}

impl Fetcher {
    pub fn new(root: impl Into<PathBuf>, config: FetchConfig) -> Self {
        Self {
            root: root.into(),
            config,
        }
    }

    /// Fetcher rooted at the process's current working directory.
    pub fn in_current_dir(config: FetchConfig) -> Result<Self> {
        let root = std::env::current_dir().context("resolve current directory")?;
        Ok(Self::new(root, config))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }

    /// True when the descriptor has a checksum and its target matches it.
    pub fn verify(&self, asset: &AssetDescriptor) -> bool {
        checksum::verify(&self.resolve(&asset.target), asset.checksum.as_deref())
    }

    /// Brings one descriptor to its terminal state; returns its success.
    pub fn process(&self, asset: &AssetDescriptor) -> bool {
        if let AssetSource::Delete { path } = &asset.source {
            self.delete(path);
            return true;
        }

        if self.verify(asset) {
            println!("  hash match - skipping");
            return true;
        }

        let target = self.resolve(&asset.target);
        if let Err(e) = ensure_parent(&target) {
            report_caught(asset, &e);
        }

        let fetched: Result<()> = match &asset.source {
            AssetSource::ArchiveMember { archive, member } => {
                println!("  hash check failed - extracting");
                println!("  get {}", member);
                extract_member(
                    &self.resolve(archive),
                    member,
                    &target,
                    self.config.buffer_bytes,
                )
                .map(|_| ())
            }
            AssetSource::DirectUrl { url } => {
                println!("  hash check failed - downloading");
                println!("  get {}", url);
                download_url(url, &target, &self.config).map(|_| ())
            }
            AssetSource::Custom { fetcher } => {
                println!("  hash check failed - downloading");
                println!("  get {}", fetcher.describe());
                fetcher.fetch_into(&target, &self.config).map(|size| {
                    println!("  size = {:.2} Mb", size as f64 / MIB);
                })
            }
            AssetSource::Delete { .. } => Ok(()),
        };
        if let Err(e) = fetched {
            report_caught(asset, &e);
        }

        println!(" done");
        println!(" file {}", target.display());
        let verified = self.verify(asset);
        if verified {
            tracing::info!(group = %asset.group, target = %asset.target.display(), "asset ready");
        } else {
            tracing::warn!(group = %asset.group, target = %asset.target.display(), "asset failed verification");
        }
        verified
    }

    fn delete(&self, path: &Path) {
        let path = self.resolve(path);
        if !path.exists() {
            return;
        }
        match fs::remove_file(&path) {
            Ok(()) => println!("  delete {}", path.display()),
            Err(e) => {
                println!("  catch {}", e);
                tracing::warn!(path = %path.display(), "could not delete file: {}", e);
            }
        }
    }

    /// Processes every descriptor whose group starts with `prefix`, in order.
    pub fn run(&self, catalog: &Catalog, prefix: Option<&str>) -> RunReport {
        let mut report = RunReport::default();
        for asset in catalog.iter() {
            if !asset.matches(prefix) {
                report.skipped += 1;
                continue;
            }
            println!("{}", asset);
            report.processed.push(asset.target.clone());
            if !self.process(asset) {
                report.failed.push(asset.target.clone());
            }
        }
        tracing::info!(
            processed = report.processed.len(),
            skipped = report.skipped,
            failed = report.failed.len(),
            "fetch run finished"
        );
        report
    }
}

fn ensure_parent(target: &Path) -> Result<()> {
    match target.parent() {
        Some(dir) if !dir.as_os_str().is_empty() && !dir.exists() => {
            println!("  creating directory: {}", dir.display());
            fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))
        }
        _ => Ok(()),
    }
}

fn report_caught(asset: &AssetDescriptor, err: &anyhow::Error) {
    println!("  catch {:#}", err);
    tracing::warn!(group = %asset.group, target = %asset.target.display(), "fetch step failed: {:#}", err);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const HELLO_SHA1: &str = "f572d396fae9206628714fb2ce00f72e94f2258f";

    /// Writes a fixed body and counts invocations.
    #[derive(Debug, Default)]
    struct StaticFetch {
        body: Vec<u8>,
        calls: AtomicUsize,
    }

    impl StaticFetch {
        fn new(body: &[u8]) -> Arc<Self> {
            Arc::new(Self {
                body: body.to_vec(),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl RemoteFetch for StaticFetch {
        fn fetch_into(&self, dst: &Path, _cfg: &FetchConfig) -> Result<u64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            fs::write(dst, &self.body)?;
            Ok(self.body.len() as u64)
        }

        fn describe(&self) -> String {
            "static".to_string()
        }
    }

    #[derive(Debug)]
    struct FailingFetch;

    impl RemoteFetch for FailingFetch {
        fn fetch_into(&self, _dst: &Path, _cfg: &FetchConfig) -> Result<u64> {
            anyhow::bail!("host unreachable")
        }

        fn describe(&self) -> String {
            "failing".to_string()
        }
    }

    fn fetcher(dir: &Path) -> Fetcher {
        Fetcher::new(dir, FetchConfig::default())
    }

    #[test]
    fn verified_target_skips_fetch() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"hello\n").unwrap();
        let remote = StaticFetch::new(b"other");
        let asset = AssetDescriptor::custom("G", "a.txt", remote.clone()).with_checksum(HELLO_SHA1);
        assert!(fetcher(dir.path()).process(&asset));
        assert_eq!(remote.calls(), 0);
        assert_eq!(fs::read(dir.path().join("a.txt")).unwrap(), b"hello\n");
    }

    #[test]
    fn custom_fetch_creates_parent_and_verifies() {
        let dir = tempfile::tempdir().unwrap();
        let remote = StaticFetch::new(b"hello\n");
        let asset =
            AssetDescriptor::custom("G", "nested/dir/a.txt", remote.clone()).with_checksum(HELLO_SHA1);
        assert!(fetcher(dir.path()).process(&asset));
        assert_eq!(remote.calls(), 1);
        assert!(dir.path().join("nested/dir/a.txt").is_file());
    }

    #[test]
    fn missing_checksum_always_refetches_and_fails() {
        let dir = tempfile::tempdir().unwrap();
        let remote = StaticFetch::new(b"hello\n");
        let asset = AssetDescriptor::custom("G", "a.txt", remote.clone());
        let f = fetcher(dir.path());
        assert!(!f.process(&asset));
        assert!(!f.process(&asset));
        assert_eq!(remote.calls(), 2);
    }

    #[test]
    fn mismatching_content_is_refetched_then_fails() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"stale").unwrap();
        let remote = StaticFetch::new(b"still wrong");
        let asset = AssetDescriptor::custom("G", "a.txt", remote.clone()).with_checksum(HELLO_SHA1);
        assert!(!fetcher(dir.path()).process(&asset));
        assert_eq!(remote.calls(), 1);
        assert_eq!(fs::read(dir.path().join("a.txt")).unwrap(), b"still wrong");
    }

    #[test]
    fn fetch_error_is_caught_and_reported_as_failure() {
        let dir = tempfile::tempdir().unwrap();
        let asset =
            AssetDescriptor::custom("G", "a.txt", Arc::new(FailingFetch)).with_checksum(HELLO_SHA1);
        assert!(!fetcher(dir.path()).process(&asset));
    }

    #[test]
    fn delete_missing_path_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let asset = AssetDescriptor::delete("G", "gone.tar.gz");
        assert!(fetcher(dir.path()).process(&asset));
    }

    #[test]
    fn delete_removes_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bundle.zip");
        fs::write(&path, b"zip").unwrap();
        assert!(fetcher(dir.path()).process(&AssetDescriptor::delete("G", "bundle.zip")));
        assert!(!path.exists());
    }

    #[test]
    fn run_filters_groups_and_collects_failures() {
        let dir = tempfile::tempdir().unwrap();
        let a1 = StaticFetch::new(b"hello\n");
        let a2 = StaticFetch::new(b"nope");
        let b = StaticFetch::new(b"hello\n");
        let catalog = Catalog::new(vec![
            AssetDescriptor::custom("A", "a1.txt", a1.clone()).with_checksum(HELLO_SHA1),
            AssetDescriptor::custom("A", "a2.txt", a2.clone()).with_checksum(HELLO_SHA1),
            AssetDescriptor::custom("B", "b.txt", b.clone()).with_checksum(HELLO_SHA1),
        ])
        .unwrap();

        let report = fetcher(dir.path()).run(&catalog, Some("A"));
        assert_eq!(report.processed, vec![PathBuf::from("a1.txt"), PathBuf::from("a2.txt")]);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed, vec![PathBuf::from("a2.txt")]);
        assert_eq!(report.exit_code(), FAILURE_EXIT_CODE);
        assert_eq!(b.calls(), 0);
        assert!(!dir.path().join("b.txt").exists());
    }

    #[test]
    fn second_run_does_no_work() {
        let dir = tempfile::tempdir().unwrap();
        let remote = StaticFetch::new(b"hello\n");
        let catalog = Catalog::new(vec![
            AssetDescriptor::custom("A", "a.txt", remote.clone()).with_checksum(HELLO_SHA1)
        ])
        .unwrap();
        let f = fetcher(dir.path());
        assert!(f.run(&catalog, None).is_success());
        let report = f.run(&catalog, None);
        assert_eq!(report.exit_code(), 0);
        assert_eq!(remote.calls(), 1);
    }
}
