//! Directory driver that moves WARC files through the transformer.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;

use crate::{
    compress::CompressionFormat,
    tika::TextExtractor,
    transform::RecordTransformer,
    validate::validate_file,
};

/// Errors that stop a directory scan.
///
/// Failures scoped to a single file are logged and counted; they never
/// surface here.
#[derive(Error, Debug)]
pub enum WatchError {
    /// The watched directory is missing or not a directory.
    #[error("not a watchable directory: {path}")]
    BadDirectory {
        /// The offending path.
        path: String,
    },

    /// IO error listing the directory.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Configuration of the directory driver.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Directory to scan for input files.
    pub directory: PathBuf,
    /// Inputs are files whose name ends with this suffix.
    pub input_suffix: String,
    /// Output names substitute the input suffix with this suffix.
    pub output_suffix: String,
    /// Pause between scans.
    pub poll_interval: Duration,
    /// Delete the input file once its output validated.
    pub delete_input: bool,
    /// Number of files processed concurrently.
    pub workers: usize,
}

impl WatchConfig {
    /// Creates a configuration with the canonical suffix scheme for the
    /// given directory.
    pub fn new<P: Into<PathBuf>>(directory: P) -> Self {
        Self {
            directory: directory.into(),
            input_suffix: ".warc.gz".to_string(),
            output_suffix: "-ViaTika.warc.gz".to_string(),
            poll_interval: Duration::from_secs(15),
            delete_input: false,
            workers: 1,
        }
    }
}

/// Result of one directory scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Files transformed and validated.
    pub processed: u64,
    /// Inputs skipped because a valid output already exists.
    pub skipped: u64,
    /// Files whose transformation or validation failed.
    pub failed: u64,
}

/// Tracks output files that are being written.
///
/// A guard is taken before an output is created; dropping it removes the
/// partial file unless [InFlightGuard::complete] was called, so error paths
/// and worker panics clean up after themselves.
#[derive(Debug, Default)]
pub struct InFlightRegistry {
    files: Mutex<HashSet<PathBuf>>,
}

impl InFlightRegistry {
    /// Creates an empty registry.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers `path` as in flight and returns its guard.
    pub fn begin(self: &Arc<Self>, path: PathBuf) -> InFlightGuard {
        self.files.lock().unwrap().insert(path.clone());

        InFlightGuard {
            registry: Arc::clone(self),
            path,
            completed: false,
        }
    }

    /// Returns whether `path` is currently being written.
    pub fn is_in_flight(&self, path: &Path) -> bool {
        self.files.lock().unwrap().contains(path)
    }
}

/// Guard for one in-flight output file.
pub struct InFlightGuard {
    registry: Arc<InFlightRegistry>,
    path: PathBuf,
    completed: bool,
}

impl InFlightGuard {
    /// Marks the output as complete so it survives the guard.
    pub fn complete(mut self) {
        self.completed = true;
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.registry.files.lock().unwrap().remove(&self.path);

        if !self.completed {
            tracing::warn!(path = ?self.path, "removing incomplete output file");
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Polls a directory and feeds eligible files through the transformer.
///
/// Each worker builds its own transformer from the factory, so extraction
/// clients are never shared. The scan is idempotent: inputs whose output
/// already exists and validates are skipped, and stale or invalid outputs
/// are deleted and redone.
pub struct Watcher<F> {
    config: WatchConfig,
    registry: Arc<InFlightRegistry>,
    factory: F,
}

impl<F, E> Watcher<F>
where
    E: TextExtractor,
    F: Fn() -> RecordTransformer<E> + Sync,
{
    /// Creates a watcher with the given configuration and transformer
    /// factory.
    pub fn new(config: WatchConfig, factory: F) -> Self {
        Self {
            config,
            registry: InFlightRegistry::new(),
            factory,
        }
    }

    /// Returns the in-flight registry.
    pub fn registry(&self) -> &Arc<InFlightRegistry> {
        &self.registry
    }

    /// Scans and processes until the process is terminated.
    ///
    /// A failing scan is logged and retried after the poll interval; the
    /// loop never gives up on the directory.
    pub fn run(&self) {
        loop {
            match self.scan_once() {
                Ok(report) => {
                    if report.processed > 0 || report.failed > 0 {
                        tracing::info!(?report, "scan complete");
                    }
                }
                Err(error) => {
                    tracing::error!(%error, "directory scan failed");
                }
            }

            std::thread::sleep(self.config.poll_interval);
        }
    }

    /// Performs a single scan over the directory.
    pub fn scan_once(&self) -> Result<ScanReport, WatchError> {
        if !self.config.directory.is_dir() {
            return Err(WatchError::BadDirectory {
                path: self.config.directory.display().to_string(),
            });
        }

        let mut report = ScanReport::default();
        let mut work = Vec::new();

        for (input, output) in self.eligible_inputs()? {
            if self.output_is_done(&output) {
                report.skipped += 1;
                continue;
            }

            work.push((input, output));
        }

        if work.is_empty() {
            return Ok(report);
        }

        let workers = self.config.workers.max(1).min(work.len());

        if workers == 1 {
            for (input, output) in work {
                if self.process_file(&input, &output) {
                    report.processed += 1;
                } else {
                    report.failed += 1;
                }
            }

            return Ok(report);
        }

        let (sender, receiver) = crossbeam_channel::unbounded::<(PathBuf, PathBuf)>();

        for item in work {
            sender.send(item).expect("work channel open");
        }
        drop(sender);

        std::thread::scope(|scope| {
            let mut handles = Vec::new();

            for _ in 0..workers {
                let receiver = receiver.clone();
                handles.push(scope.spawn(move || {
                    let mut counts = (0u64, 0u64);

                    for (input, output) in receiver.iter() {
                        if self.process_file(&input, &output) {
                            counts.0 += 1;
                        } else {
                            counts.1 += 1;
                        }
                    }

                    counts
                }));
            }

            for handle in handles {
                if let Ok((processed, failed)) = handle.join() {
                    report.processed += processed;
                    report.failed += failed;
                }
            }
        });

        Ok(report)
    }

    fn eligible_inputs(&self) -> Result<Vec<(PathBuf, PathBuf)>, WatchError> {
        let mut inputs = Vec::new();

        for entry in std::fs::read_dir(&self.config.directory)? {
            let entry = entry?;
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(_) => continue,
            };

            if !name.ends_with(&self.config.input_suffix)
                || name.ends_with(&self.config.output_suffix)
            {
                continue;
            }

            let output_name = format!(
                "{}{}",
                &name[..name.len() - self.config.input_suffix.len()],
                self.config.output_suffix
            );

            inputs.push((entry.path(), self.config.directory.join(output_name)));
        }

        inputs.sort();

        Ok(inputs)
    }

    /// Decides whether an existing output file settles its input.
    ///
    /// Zero-length and validator-rejected outputs are leftovers of an
    /// interrupted run; they are deleted so the input gets reprocessed.
    fn output_is_done(&self, output: &Path) -> bool {
        if self.registry.is_in_flight(output) {
            return true;
        }

        let metadata = match std::fs::metadata(output) {
            Ok(metadata) => metadata,
            Err(_) => return false,
        };

        if metadata.len() == 0 {
            tracing::warn!(?output, "deleting zero-length output");
            let _ = std::fs::remove_file(output);
            return false;
        }

        match validate_file(output) {
            Ok(_) => true,
            Err(error) => {
                tracing::warn!(?output, %error, "deleting invalid output");
                let _ = std::fs::remove_file(output);
                false
            }
        }
    }

    fn process_file(&self, input: &Path, output: &Path) -> bool {
        let guard = self.registry.begin(output.to_path_buf());
        let mut transformer = (self.factory)();

        let compression = if output
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("gz"))
            .unwrap_or(false)
        {
            CompressionFormat::Gzip
        } else {
            CompressionFormat::Raw
        };

        if let Err(error) = transformer.transform_file(input, output, compression) {
            tracing::warn!(?input, %error, "failed to transform file");
            return false;
        }

        match validate_file(output) {
            Ok(records) => {
                tracing::info!(?output, records, "output validated");
            }
            Err(error) => {
                tracing::warn!(?output, %error, "produced file failed validation, deleting it");
                return false;
            }
        }

        guard.complete();

        if self.config.delete_input {
            tracing::info!(?input, "deleting input");
            if let Err(error) = std::fs::remove_file(input) {
                tracing::warn!(?input, %error, "failed to delete input");
            }
        }

        true
    }
}
