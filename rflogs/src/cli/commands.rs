use std::collections::HashSet;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::ArgMatches;
use client::report::{self, Reporter};
use client::table;
use client::upload::{self, RetryPolicy, UploadRequest};
use client::{Error, Result, Transfer};
use kernel::Tag;

use super::config::Settings;

/// How a command that ran to completion ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    /// Some part of the work failed, details already printed
    Failure,
    NotFound,
}

/// Builds the upload request from the command line. Tags are validated
/// here so a malformed tag fails before any network call.
pub fn upload_request(matches: &ArgMatches, settings: &Settings) -> Result<UploadRequest> {
    let tags = matches
        .get_many::<String>("tag")
        .into_iter()
        .flatten()
        .map(|t| t.parse::<Tag>())
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let directory = matches
        .get_one::<PathBuf>("directory")
        .cloned()
        .unwrap_or_else(|| PathBuf::from("."));
    let name = |id: &str| matches.get_one::<String>(id).map(String::as_str);
    let retries = matches
        .get_one::<u32>("retries")
        .copied()
        .unwrap_or(settings.retries);

    Ok(UploadRequest {
        directory,
        plan: settings.plan(name("output"), name("log"), name("report")),
        tags,
        retry: RetryPolicy {
            retries,
            ..RetryPolicy::default()
        },
    })
}

pub async fn upload<T, R>(
    transfer: &T,
    request: &UploadRequest,
    step_summary: Option<&Path>,
    reporter: &mut R,
) -> Result<Status>
where
    T: Transfer,
    R: Reporter + ?Sized,
{
    let result = upload::upload(transfer, request, reporter).await?;
    if let Some(path) = step_summary {
        if let Err(e) = report::append_step_summary(path, &result.links) {
            reporter.warning(&format!(
                "cannot write step summary {}: {e}",
                path.display()
            ));
        }
    }
    Ok(if result.is_complete() {
        Status::Success
    } else {
        Status::Failure
    })
}

pub async fn list<T: Transfer, W: Write>(transfer: &T, out: &mut W) -> Result<Status> {
    let runs = transfer.list_runs().await?;
    if runs.is_empty() {
        writeln!(out, "No runs found.").map_err(console)?;
    } else {
        writeln!(out, "{}", table::runs_table(&runs)).map_err(console)?;
    }
    Ok(Status::Success)
}

pub async fn info<T: Transfer, W: Write>(transfer: &T, run_id: &str, out: &mut W) -> Result<Status> {
    let run = transfer.get_run(run_id).await?;
    writeln!(out, "{}", table::run_table(&run)).map_err(console)?;
    if !run.files.is_empty() {
        writeln!(out).map_err(console)?;
        writeln!(out, "{}", table::files_table(&run)).map_err(console)?;
    }
    Ok(Status::Success)
}

/// Saves every file of the run into `output_dir` under its own name.
/// A failing file does not stop the others. Files sharing a name get a
/// numeric suffix.
pub async fn download<T, W, E>(
    transfer: &T,
    run_id: &str,
    output_dir: &Path,
    out: &mut W,
    err: &mut E,
) -> Result<Status>
where
    T: Transfer,
    W: Write,
    E: Write,
{
    let run = transfer.get_run(run_id).await?;
    if run.files.is_empty() {
        return Err(Error::NotFound(format!("files of run {run_id}")));
    }
    tokio::fs::create_dir_all(output_dir)
        .await
        .map_err(|e| Error::io(output_dir, e))?;

    let mut status = Status::Success;
    let mut taken = HashSet::new();
    for file in &run.files {
        let Some(name) = local_name(&file.name) else {
            let _ = writeln!(err, "Skipping {}: not a plain file name", file.name);
            status = Status::Failure;
            continue;
        };
        let local = unique_name(name, &mut taken);
        if local != name {
            let _ = writeln!(err, "Saving {} as {local}: name already used", file.name);
        }
        let target = output_dir.join(&local);
        match transfer.download_file(file, &target).await {
            Ok(_) => writeln!(out, "Downloaded {local}").map_err(console)?,
            Err(e) => {
                let _ = writeln!(err, "Failed to download {}: {e}", file.name);
                status = Status::Failure;
            }
        }
    }
    Ok(status)
}

pub async fn delete<T, W, E>(transfer: &T, run_id: &str, out: &mut W, err: &mut E) -> Result<Status>
where
    T: Transfer,
    W: Write,
    E: Write,
{
    match transfer.delete_run(run_id).await {
        Ok(deleted) => {
            tracing::debug!("run {run_id}: {} files removed", deleted.files);
            writeln!(out, "Run {run_id} deleted successfully.").map_err(console)?;
            Ok(Status::Success)
        }
        Err(Error::NotFound(_)) => {
            let _ = writeln!(
                err,
                "Run {run_id} not found or you are not authorized to delete it."
            );
            Ok(Status::NotFound)
        }
        Err(e) => Err(e),
    }
}

// last path component, `None` for names such as `..`
fn local_name(name: &str) -> Option<&str> {
    let candidate = name.rsplit(['/', '\\']).next()?;
    match candidate {
        "" | "." | ".." => None,
        _ => Some(candidate),
    }
}

// `name`, or `name` with a `-N` suffix before the extension when taken
fn unique_name(name: &str, taken: &mut HashSet<String>) -> String {
    let path = Path::new(name);
    let mut candidate = name.to_owned();
    let mut n = 1;
    while taken.contains(&candidate) {
        n += 1;
        candidate = match (path.file_stem(), path.extension()) {
            (Some(stem), Some(ext)) => format!(
                "{}-{n}.{}",
                stem.to_string_lossy(),
                ext.to_string_lossy()
            ),
            _ => format!("{name}-{n}"),
        };
    }
    taken.insert(candidate.clone());
    candidate
}

fn console(e: io::Error) -> Error {
    Error::io("<stdout>", e)
}
