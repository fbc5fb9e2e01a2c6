//! Runs several software managers, optionally in parallel.
//!
//! Items touch disjoint files, registry keys and variables, so they may run
//! concurrently; each item's own sequence stays strictly ordered. A failed
//! item is logged and reported but does not stop the others.

use crate::error::{Error, Result};
use crate::manager::SoftwareManager;
use crate::types::ProvisionReport;
use rayon::prelude::*;

/// Outcome of one item.
#[derive(Debug)]
pub struct ItemOutcome {
    /// Software name.
    pub software: String,
    /// Report, or the failure that stopped the item.
    pub result: Result<ProvisionReport>,
}

impl ItemOutcome {
    /// Whether the item reached the configured state.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Provision every manager on a pool of `jobs` threads.
///
/// Outcomes are returned in input order.
pub fn provision_all(managers: &[SoftwareManager], jobs: usize) -> Result<Vec<ItemOutcome>> {
    provision_all_with(managers, jobs, |_| {})
}

/// Like [`provision_all`], calling `on_done` as each item finishes.
pub fn provision_all_with<F>(
    managers: &[SoftwareManager],
    jobs: usize,
    on_done: F,
) -> Result<Vec<ItemOutcome>>
where
    F: Fn(&ItemOutcome) + Sync,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.max(1))
        .build()
        .map_err(|e| Error::config(format!("failed to create provisioning thread pool: {e}")))?;

    Ok(pool.install(|| {
        managers
            .par_iter()
            .map(|manager| {
                let outcome = ItemOutcome {
                    software: manager.name().to_string(),
                    result: manager.ensure_configured(),
                };
                if let Err(e) = &outcome.result {
                    log_failure(manager, e);
                }
                on_done(&outcome);
                outcome
            })
            .collect()
    }))
}

fn log_failure(manager: &SoftwareManager, err: &Error) {
    match err {
        Error::InstallFailed {
            exit_code, stderr, ..
        } => log::error!(
            "{} failed: installer {} exited with code {} (log: {}): {}",
            manager.name(),
            manager.archive_path().display(),
            exit_code,
            manager.log_path().display(),
            stderr.trim()
        ),
        other => log::error!(
            "{} failed ({}): {}",
            manager.name(),
            manager.artifact_file_name(),
            other
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ArchiveCache;
    use crate::installer::ArchiveInstaller;
    use crate::probe::MarkerProbe;
    use crate::source::MockSource;
    use std::io::Write;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn zip_payload() -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        zip.start_file("bin/run", zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(b"run").unwrap();
        zip.start_file("README", zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(b"readme").unwrap();
        zip.finish().unwrap().into_inner()
    }

    fn item(root: &Path, name: &str, source: MockSource) -> SoftwareManager {
        SoftwareManager::new(
            name,
            Box::new(source.named(&format!("{name}.zip"))),
            Box::new(MarkerProbe::new(root.join(name))),
            Box::new(ArchiveInstaller::new(name, root.join(name))),
            &ArchiveCache::new(root.join("archive")),
            root.join("logs").join(format!("{name}.txt")),
        )
    }

    fn managers(root: &Path) -> Vec<SoftwareManager> {
        vec![
            item(root, "first", MockSource::with_payload(zip_payload())),
            item(root, "broken", MockSource::failing(503)),
            item(root, "third", MockSource::with_payload(zip_payload())),
        ]
    }

    #[test]
    fn test_provision_all_keeps_input_order() {
        let dir = tempfile::tempdir().unwrap();
        let managers = managers(dir.path());

        let outcomes = provision_all(&managers, 3).unwrap();

        let names: Vec<_> = outcomes.iter().map(|o| o.software.as_str()).collect();
        assert_eq!(names, vec!["first", "broken", "third"]);
        assert!(dir.path().join("first").join("bin").join("run").is_file());
        assert!(dir.path().join("third").join("bin").join("run").is_file());
    }

    #[test]
    fn test_failure_does_not_stop_other_items() {
        let dir = tempfile::tempdir().unwrap();
        let managers = managers(dir.path());
        let seen = AtomicUsize::new(0);

        let outcomes = provision_all_with(&managers, 1, |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), 3);
        assert!(outcomes[0].is_success());
        assert!(matches!(
            outcomes[1].result,
            Err(Error::FetchFailed {
                status: Some(503),
                ..
            })
        ));
        assert!(outcomes[2].is_success());
        assert!(!dir.path().join("broken").exists());
    }

    #[test]
    fn test_zero_jobs_runs_sequentially() {
        let dir = tempfile::tempdir().unwrap();
        let outcomes = provision_all(&managers(dir.path())[..1], 0).unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].is_success());
    }
}
