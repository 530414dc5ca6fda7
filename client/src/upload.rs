//! Upload pipeline: locate, compress, transfer, aggregate, report.

use std::path::{Path, PathBuf};
use std::time::Duration;

use kernel::{CreateRun, FileRole, RunStats, Tag, UploadedFile};

use crate::Transfer;
use crate::compress::{self, PreparedFile};
use crate::error::{Error, Result};
use crate::locator::{Candidate, Located, UploadPlan};
use crate::report::{FileProgress, Reporter};
use crate::resource::Resource;
use crate::stats;

const HTML_EXTENSION: &str = ".html";

/// How failed file uploads are repeated. No retries by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 0,
            delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub directory: PathBuf,
    pub plan: UploadPlan,
    pub tags: Vec<Tag>,
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FileStatus {
    Uploaded(UploadedFile),
    Failed(String),
}

/// Result of handling one located file.
#[derive(Debug, Clone, PartialEq)]
pub struct FileOutcome {
    pub role: FileRole,
    /// Local name relative to the upload directory
    pub name: String,
    pub original_size: Option<u64>,
    pub compressed_size: Option<u64>,
    pub status: FileStatus,
}

impl FileOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.status, FileStatus::Uploaded(_))
    }

    #[must_use]
    pub fn transmitted_size(&self) -> u64 {
        self.compressed_size
            .or(self.original_size)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileLink {
    pub role: FileRole,
    pub label: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunLinks {
    /// Run overview page
    pub overview: String,
    /// One entry per uploaded HTML file
    pub files: Vec<FileLink>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunResult {
    pub run_id: String,
    /// Outcomes in resolution order, failures included
    pub files: Vec<FileOutcome>,
    pub links: RunLinks,
}

impl RunResult {
    /// Number of successfully uploaded files.
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.files.iter().filter(|f| f.is_success()).count()
    }

    /// Sum of transmitted sizes of successfully uploaded files.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.files
            .iter()
            .filter(|f| f.is_success())
            .map(FileOutcome::transmitted_size)
            .sum()
    }

    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.files.len() - self.file_count()
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed_count() == 0
    }
}

/// Uploads every located file of `request.directory` into a new run.
///
/// Per-file failures are reported and recorded in the result; the call only
/// fails when nothing can be uploaded at all.
pub async fn upload<T, R>(transfer: &T, request: &UploadRequest, reporter: &mut R) -> Result<RunResult>
where
    T: Transfer,
    R: Reporter + ?Sized,
{
    let located = request.plan.locate(&request.directory);
    if located.iter().all(|l| l.candidate().is_none()) {
        return Err(Error::NothingToUpload(request.directory.clone()));
    }

    let stats = match located
        .iter()
        .filter_map(Located::candidate)
        .find(|c| c.role == FileRole::Output)
    {
        Some(output) => read_stats(output, reporter).await,
        None => RunStats::default(),
    };

    let create = CreateRun {
        stats,
        tags: request.tags.iter().map(Tag::to_wire).collect(),
    };
    let run_id = transfer.create_run(&create).await?;
    reporter.run_created(&run_id);

    let mut files = Vec::with_capacity(located.len());
    for entry in located {
        let outcome = match entry {
            Located::Missing(missing) => {
                reporter.file_started(&FileProgress {
                    name: &missing.name,
                    original_size: None,
                    compressed_size: None,
                });
                tracing::error!("{}: {}", missing.path.display(), missing.error);
                FileOutcome {
                    role: missing.role,
                    name: missing.name,
                    original_size: None,
                    compressed_size: None,
                    status: FileStatus::Failed(format!(
                        "{}: {}",
                        missing.path.display(),
                        missing.error
                    )),
                }
            }
            Located::Found(candidate) => {
                upload_candidate(transfer, &run_id, candidate, request.retry, reporter).await
            }
        };
        reporter.file_finished(&outcome);
        files.push(outcome);
    }

    let links = build_links(transfer.base(), &run_id, &files);
    let result = RunResult {
        run_id,
        files,
        links,
    };
    if result.file_count() == 0 {
        return Err(Error::UploadFailed {
            run_id: result.run_id,
        });
    }
    reporter.finished(&result);
    Ok(result)
}

async fn read_stats<R: Reporter + ?Sized>(output: &Candidate, reporter: &mut R) -> RunStats {
    let path = output.path.clone();
    let parsed = tokio::task::spawn_blocking(move || stats::read_stats(&path)).await;
    match parsed {
        Ok(Ok(stats)) => stats,
        Ok(Err(e)) => {
            reporter.warning(&format!("cannot read test statistics: {e}"));
            RunStats::default()
        }
        Err(e) => {
            reporter.warning(&format!("cannot read test statistics: {e}"));
            RunStats::default()
        }
    }
}

async fn upload_candidate<T, R>(
    transfer: &T,
    run_id: &str,
    candidate: Candidate,
    retry: RetryPolicy,
    reporter: &mut R,
) -> FileOutcome
where
    T: Transfer,
    R: Reporter + ?Sized,
{
    let prepared = prepare(&candidate, reporter).await;
    reporter.file_started(&FileProgress {
        name: &candidate.name,
        original_size: Some(prepared.original_size),
        compressed_size: prepared.compressed_size,
    });

    let status = match upload_with_retry(transfer, run_id, &prepared, retry).await {
        Ok(uploaded) => FileStatus::Uploaded(uploaded),
        Err(e) => {
            tracing::error!("file '{}' not uploaded. Error: {e}", candidate.name);
            FileStatus::Failed(e.to_string())
        }
    };

    FileOutcome {
        role: candidate.role,
        name: candidate.name,
        original_size: Some(prepared.original_size),
        compressed_size: prepared.compressed_size,
        status,
    }
}

async fn prepare<R: Reporter + ?Sized>(candidate: &Candidate, reporter: &mut R) -> PreparedFile {
    if !compress::needs_compression(candidate.role, candidate.size) {
        return PreparedFile::uncompressed(candidate);
    }
    let owned = candidate.clone();
    let (prepared, warning) = match tokio::task::spawn_blocking(move || compress::prepare(&owned)).await {
        Ok(r) => r,
        Err(e) => (
            PreparedFile::uncompressed(candidate),
            Some(std::io::Error::other(e)),
        ),
    };
    if let Some(e) = warning {
        reporter.warning(&format!(
            "could not compress {}, uploading it uncompressed: {e}",
            candidate.name
        ));
    }
    prepared
}

async fn upload_with_retry<T: Transfer>(
    transfer: &T,
    run_id: &str,
    file: &PreparedFile,
    retry: RetryPolicy,
) -> Result<UploadedFile> {
    let mut attempt = 0;
    loop {
        match transfer.upload_file(run_id, file).await {
            Ok(uploaded) => return Ok(uploaded),
            Err(e) if e.is_retryable() && attempt < retry.retries => {
                attempt += 1;
                tracing::warn!(
                    "upload of {} failed ({e}), retry {attempt} of {}",
                    file.name,
                    retry.retries
                );
                tokio::time::sleep(retry.delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Builds the run overview link and one link per uploaded HTML file.
#[must_use]
pub fn build_links(base: &Resource, run_id: &str, files: &[FileOutcome]) -> RunLinks {
    let mut overview = base.join_path("run-details.html");
    overview.append_query("runId", run_id);

    let files = files
        .iter()
        .filter_map(|f| match &f.status {
            FileStatus::Uploaded(uploaded) if is_html(&f.name) => Some(FileLink {
                role: f.role,
                label: label(&f.name),
                url: file_url(base, &uploaded.file_url),
            }),
            _ => None,
        })
        .collect();

    RunLinks {
        overview: overview.to_string(),
        files,
    }
}

fn is_html(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with(HTML_EXTENSION)
}

// `log.html` -> `Log`, `custom_report.html` -> `Custom_report`
fn label(name: &str) -> String {
    let stem = Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut chars = stem.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => stem,
    }
}

fn file_url(base: &Resource, file_url: &str) -> String {
    if file_url.starts_with("http://") || file_url.starts_with("https://") {
        file_url.to_owned()
    } else {
        base.join_path(file_url).to_string()
    }
}
