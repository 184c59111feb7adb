//! Access to the process-information filesystem.
//!
//! Everything is relative to a configurable root so the exporter can run in a
//! container with the host's `/proc` mounted elsewhere, and so tests can build
//! a fake tree in a temporary directory.

use core::error::Error;
use std::path::Path;
use std::path::PathBuf;

use derive_more::Display;
use error_stack::Report;
use error_stack::ResultExt;
use tokio::fs;

use crate::core::namespace::NamespaceError;
use crate::core::namespace::PidNamespace;
use crate::core::smaps::parse_smaps;
use crate::core::smaps::SmapsError;
use crate::core::smaps::SmapsMapping;

#[derive(Debug, Display)]
pub enum ProcFsError {
    #[display("cannot read proc directory {path}")]
    ProcReadError { path: String },
}

impl Error for ProcFsError {}

#[derive(Debug, Clone)]
pub struct ProcFs {
    root: PathBuf,
}

impl ProcFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn pid_path(&self, pid: u32, entry: &str) -> PathBuf {
        self.root.join(pid.to_string()).join(entry)
    }

    /// Lists the numeric directories of the root. Anything else is skipped.
    ///
    /// # Errors
    ///
    /// - [`ProcFsError::ProcReadError`] if the root cannot be listed
    pub async fn pids(&self) -> Result<Vec<u32>, Report<ProcFsError>> {
        let proc_read_error = || ProcFsError::ProcReadError {
            path: self.root.display().to_string(),
        };

        let mut dir = fs::read_dir(&self.root)
            .await
            .change_context_lazy(proc_read_error)?;

        let mut pids = Vec::new();
        while let Some(entry) = dir.next_entry().await.change_context_lazy(proc_read_error)? {
            let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse().ok()) else {
                continue;
            };
            if entry.file_type().await.is_ok_and(|t| t.is_dir()) {
                pids.push(pid);
            }
        }
        Ok(pids)
    }

    /// Short command name of `pid`, whitespace trimmed.
    ///
    /// # Errors
    ///
    /// - [`SmapsError::ReadFailure`] if `comm` cannot be read
    pub async fn comm(&self, pid: u32) -> Result<String, Report<SmapsError>> {
        let path = self.pid_path(pid, "comm");
        let raw = fs::read(&path)
            .await
            .change_context(SmapsError::ReadFailure)
            .attach_printable_lazy(|| format!("path: {}", path.display()))?;
        Ok(String::from_utf8_lossy(&raw).trim().to_string())
    }

    /// PID namespace of `pid`, read from the `ns/pid` link.
    ///
    /// # Errors
    ///
    /// - [`NamespaceError::NamespaceUnavailable`] if the link cannot be read
    /// - [`NamespaceError::MalformedNamespaceLink`] if its target is not `pid:[N]`
    pub async fn pid_namespace(&self, pid: u32) -> Result<PidNamespace, Report<NamespaceError>> {
        let link = fs::read_link(self.pid_path(pid, "ns/pid"))
            .await
            .change_context(NamespaceError::NamespaceUnavailable { pid })?;
        PidNamespace::from_link(&link.to_string_lossy())
    }

    /// Reads and parses `<root>/<pid>/smaps`.
    ///
    /// # Errors
    ///
    /// - [`SmapsError::ReadFailure`] if the report cannot be read
    pub async fn smaps(&self, pid: u32) -> Result<Vec<SmapsMapping>, Report<SmapsError>> {
        let path = self.pid_path(pid, "smaps");
        let raw = fs::read(&path)
            .await
            .change_context(SmapsError::ReadFailure)
            .attach_printable_lazy(|| format!("path: {}", path.display()))?;
        parse_smaps(raw.as_slice())
            .attach_printable_lazy(|| format!("path: {}", path.display()))
    }
}


#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;
    use test_log::test;

    use super::testing::fake_process;
    use super::testing::fake_smaps;
    use super::*;

    #[test(tokio::test)]
    async fn lists_only_numeric_directories() {
        let root = tempfile::tempdir().expect("tempdir");
        fake_process(root.path(), 1, 10, "init");
        fake_process(root.path(), 42, 10, "app");
        std::fs::create_dir(root.path().join("self")).expect("mkdir");
        std::fs::write(root.path().join("meminfo"), "").expect("write");
        std::fs::write(root.path().join("123"), "").expect("write");

        let mut pids = ProcFs::new(root.path()).pids().await.expect("readable root");
        pids.sort_unstable();

        assert_eq!(pids, vec![1, 42]);
    }

    #[test(tokio::test)]
    async fn missing_root_is_an_error() {
        let root = tempfile::tempdir().expect("tempdir");
        let procfs = ProcFs::new(root.path().join("nope"));

        assert!(procfs.pids().await.is_err());
    }

    #[test(tokio::test)]
    async fn reads_trimmed_comm() {
        let root = tempfile::tempdir().expect("tempdir");
        fake_process(root.path(), 7, 10, "nginx");

        let comm = ProcFs::new(root.path()).comm(7).await.expect("comm exists");

        assert_eq!(comm, "nginx");
    }

    #[test(tokio::test)]
    async fn resolves_namespace_from_link() {
        let root = tempfile::tempdir().expect("tempdir");
        fake_process(root.path(), 7, 4026532001, "nginx");
        let procfs = ProcFs::new(root.path());

        let ns = procfs.pid_namespace(7).await.expect("link exists");

        assert_eq!(ns, PidNamespace(4026532001));
        assert_ne!(ns, PidNamespace(4026531836));
    }

    #[test(tokio::test)]
    async fn missing_namespace_link_is_unavailable() {
        let root = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(root.path().join("9")).expect("mkdir");
        let procfs = ProcFs::new(root.path());

        let err = procfs.pid_namespace(9).await.expect_err("no ns link");
        assert!(matches!(
            err.current_context(),
            NamespaceError::NamespaceUnavailable { pid: 9 }
        ));
    }

    #[test(tokio::test)]
    async fn reads_and_parses_smaps() {
        let root = tempfile::tempdir().expect("tempdir");
        fake_process(root.path(), 7, 10, "nginx");
        fake_smaps(
            root.path(),
            7,
            "00400000-00401000 r-xp 00000000 08:01 1 /usr/sbin/nginx\nRss: 12 kB\n",
        );

        let mappings = ProcFs::new(root.path()).smaps(7).await.expect("smaps exists");

        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].path, "/usr/sbin/nginx");
        assert_eq!(mappings[0].rss, 12 * 1024);
    }

    #[test(tokio::test)]
    async fn missing_smaps_is_read_failure() {
        let root = tempfile::tempdir().expect("tempdir");
        fake_process(root.path(), 7, 10, "nginx");

        let err = ProcFs::new(root.path()).smaps(7).await.expect_err("no smaps");

        assert!(matches!(err.current_context(), SmapsError::ReadFailure));
    }
}
