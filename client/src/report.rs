//! Progress and summary output for uploads.
//!
//! Two mutually exclusive renderings exist: a human readable one for
//! terminals and a `RFLOGS_*=value` one for CI systems capturing step
//! outputs. The mode is resolved once at startup and handed in.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;

use kernel::FileRole;

use crate::upload::{FileOutcome, FileStatus, RunLinks, RunResult};

pub const CI_PREFIX: &str = "RFLOGS_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Interactive,
    Ci,
}

impl OutputMode {
    /// Resolves the mode from environment lookups.
    ///
    /// `CI` set to anything but an empty string, `false` or `0` selects CI
    /// mode, as does `GITHUB_ACTIONS=true`.
    pub fn detect<F>(var: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let ci = var("CI").is_some_and(|v| {
            let v = v.trim();
            !v.is_empty() && !v.eq_ignore_ascii_case("false") && v != "0"
        });
        let github = var("GITHUB_ACTIONS").is_some_and(|v| v.trim() == "true");
        if ci || github {
            OutputMode::Ci
        } else {
            OutputMode::Interactive
        }
    }
}

/// What is known about a file right before it is sent.
pub struct FileProgress<'a> {
    pub name: &'a str,
    pub original_size: Option<u64>,
    pub compressed_size: Option<u64>,
}

/// Receives upload events in resolution order.
pub trait Reporter {
    fn run_created(&mut self, run_id: &str);

    fn file_started(&mut self, file: &FileProgress<'_>);

    fn file_finished(&mut self, outcome: &FileOutcome);

    fn warning(&mut self, message: &str);

    fn finished(&mut self, result: &RunResult);
}

/// Builds the reporter matching `mode` on top of stdout and stderr.
#[must_use]
pub fn for_mode(mode: OutputMode) -> Box<dyn Reporter> {
    match mode {
        OutputMode::Interactive => Box::new(InteractiveReporter::new(io::stdout(), io::stderr())),
        OutputMode::Ci => Box::new(CiReporter::new(io::stdout(), io::stderr())),
    }
}

impl<R: Reporter + ?Sized> Reporter for Box<R> {
    fn run_created(&mut self, run_id: &str) {
        (**self).run_created(run_id);
    }

    fn file_started(&mut self, file: &FileProgress<'_>) {
        (**self).file_started(file);
    }

    fn file_finished(&mut self, outcome: &FileOutcome) {
        (**self).file_finished(outcome);
    }

    fn warning(&mut self, message: &str) {
        (**self).warning(message);
    }

    fn finished(&mut self, result: &RunResult) {
        (**self).finished(result);
    }
}

pub struct InteractiveReporter<W: Write, E: Write> {
    out: W,
    err: E,
    line_open: bool,
}

impl<W: Write, E: Write> InteractiveReporter<W, E> {
    pub fn new(out: W, err: E) -> Self {
        Self {
            out,
            err,
            line_open: false,
        }
    }

    pub fn into_inner(self) -> (W, E) {
        (self.out, self.err)
    }

    fn close_line(&mut self) {
        if self.line_open {
            let _ = writeln!(self.out);
            self.line_open = false;
        }
    }
}

impl<W: Write, E: Write> Reporter for InteractiveReporter<W, E> {
    fn run_created(&mut self, _run_id: &str) {
        let _ = writeln!(self.out, "Uploading results");
    }

    fn file_started(&mut self, file: &FileProgress<'_>) {
        let size = file.original_size.map(format_size).unwrap_or_default();
        let _ = write!(self.out, "  {:<40} {size:>8}", file.name);
        if let Some(compressed) = file.compressed_size {
            let _ = write!(self.out, " - compressed to {}", format_size(compressed));
        }
        let _ = self.out.flush();
        self.line_open = true;
    }

    fn file_finished(&mut self, outcome: &FileOutcome) {
        let marker = if outcome.is_success() { "[OK]" } else { "[FAIL]" };
        let _ = writeln!(self.out, " {marker}");
        self.line_open = false;
        if let FileStatus::Failed(reason) = &outcome.status {
            let _ = writeln!(self.err, "Error uploading {}: {reason}", outcome.name);
        }
    }

    fn warning(&mut self, message: &str) {
        self.close_line();
        let _ = writeln!(self.err, "Warning: {message}");
    }

    fn finished(&mut self, result: &RunResult) {
        self.close_line();
        let _ = writeln!(self.out);
        let _ = writeln!(self.out, "Run ID: {}", result.run_id);
        let _ = writeln!(self.out, "Files:  {}", result.file_count());
        let _ = writeln!(self.out, "Size:   {}", format_size(result.total_size()));

        let _ = writeln!(self.out);
        if !result.links.files.is_empty() {
            let _ = writeln!(self.out, "HTML Files:");
            for link in &result.links.files {
                let label = format!("{}:", link.label);
                let _ = writeln!(self.out, "  {label:<10} {}", link.url);
            }
        }
        let _ = writeln!(self.out, "  {:<10} {}", "Run:", result.links.overview);

        if !result.is_complete() {
            let _ = writeln!(
                self.out,
                "\nUpload incomplete: {} of {} files failed.",
                result.failed_count(),
                result.files.len()
            );
        }
        let _ = self.out.flush();
    }
}

pub struct CiReporter<W: Write, E: Write> {
    out: W,
    err: E,
}

impl<W: Write, E: Write> CiReporter<W, E> {
    pub fn new(out: W, err: E) -> Self {
        Self { out, err }
    }

    pub fn into_inner(self) -> (W, E) {
        (self.out, self.err)
    }
}

impl<W: Write, E: Write> Reporter for CiReporter<W, E> {
    fn run_created(&mut self, run_id: &str) {
        tracing::info!("run {run_id} created");
    }

    fn file_started(&mut self, _file: &FileProgress<'_>) {}

    fn file_finished(&mut self, outcome: &FileOutcome) {
        if let FileStatus::Failed(reason) = &outcome.status {
            let _ = writeln!(self.err, "Error uploading {}: {reason}", outcome.name);
        }
    }

    fn warning(&mut self, message: &str) {
        let _ = writeln!(self.err, "Warning: {message}");
    }

    fn finished(&mut self, result: &RunResult) {
        for (key, value) in ci_variables(result) {
            let _ = writeln!(self.out, "{CI_PREFIX}{key}={value}");
        }
        let _ = self.out.flush();
    }
}

/// Key/value pairs emitted in CI mode, keys without the prefix.
#[must_use]
pub fn ci_variables(result: &RunResult) -> Vec<(String, String)> {
    let mut vars = vec![
        ("RUN_ID".to_owned(), result.run_id.clone()),
        ("OVERVIEW".to_owned(), result.links.overview.clone()),
    ];
    for link in &result.links.files {
        let key = match link.role {
            FileRole::Log => "LOG".to_owned(),
            FileRole::Report => "REPORT".to_owned(),
            _ => variable_name(&link.label),
        };
        vars.push((key, link.url.clone()));
    }
    vars
}

fn variable_name(label: &str) -> String {
    label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Appends markdown links to the GitHub Actions step summary file.
pub fn append_step_summary(path: &Path, links: &RunLinks) -> io::Result<()> {
    let mut entries: Vec<String> = links
        .files
        .iter()
        .map(|l| format!("[{}]({})", l.label, l.url))
        .collect();
    if entries.is_empty() {
        entries.push(format!("[Results]({})", links.overview));
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", entries.join(" "))
}

#[must_use]
pub fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    #[allow(clippy::cast_precision_loss)]
    let value = size as f64;
    if size < KB {
        format!("{size} B")
    } else if size < MB {
        format!("{:.2} KB", value / KB as f64)
    } else {
        format!("{:.2} MB", value / MB as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::FileLink;
    use kernel::UploadedFile;
    use rstest::rstest;
    use std::collections::HashMap;

    fn uploaded(role: FileRole, name: &str, size: u64) -> FileOutcome {
        FileOutcome {
            role,
            name: name.to_owned(),
            original_size: Some(size),
            compressed_size: None,
            status: FileStatus::Uploaded(UploadedFile {
                id: format!("id-{name}"),
                name: name.to_owned(),
                size: Some(size),
                file_url: format!("/files/1234abcd/{name}"),
            }),
        }
    }

    fn result(files: Vec<FileOutcome>) -> RunResult {
        RunResult {
            run_id: "1234abcd".to_owned(),
            links: RunLinks {
                overview: "https://rflogs.io/run-details.html?runId=1234abcd".to_owned(),
                files: vec![
                    FileLink {
                        role: FileRole::Log,
                        label: "Log".to_owned(),
                        url: "https://rflogs.io/files/1234abcd/log.html".to_owned(),
                    },
                    FileLink {
                        role: FileRole::Report,
                        label: "Report".to_owned(),
                        url: "https://rflogs.io/files/1234abcd/report.html".to_owned(),
                    },
                ],
            },
            files,
        }
    }

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[rstest]
    #[case(0, "0 B")]
    #[case(1023, "1023 B")]
    #[case(1024, "1.00 KB")]
    #[case(819_200, "800.00 KB")]
    #[case(1_258_291, "1.20 MB")]
    #[trace]
    fn format_size_tests(#[case] size: u64, #[case] expected: &str) {
        assert_eq!(format_size(size), expected);
    }

    #[rstest]
    #[case(&[], OutputMode::Interactive)]
    #[case(&[("CI", "true")], OutputMode::Ci)]
    #[case(&[("CI", "1")], OutputMode::Ci)]
    #[case(&[("CI", "false")], OutputMode::Interactive)]
    #[case(&[("CI", "")], OutputMode::Interactive)]
    #[case(&[("GITHUB_ACTIONS", "true")], OutputMode::Ci)]
    #[case(&[("GITHUB_ACTIONS", "false")], OutputMode::Interactive)]
    #[trace]
    fn detect_mode(#[case] vars: &[(&str, &str)], #[case] expected: OutputMode) {
        // Act
        let mode = OutputMode::detect(env(vars));

        // Assert
        assert_eq!(mode, expected);
    }

    #[test]
    fn ci_mode_prints_exactly_four_variables_for_default_files() {
        // Arrange
        let r = result(vec![
            uploaded(FileRole::Output, "output.xml", 100),
            uploaded(FileRole::Log, "log.html", 200),
            uploaded(FileRole::Report, "report.html", 300),
        ]);
        let mut reporter = CiReporter::new(Vec::new(), Vec::new());

        // Act
        reporter.run_created(&r.run_id);
        for f in &r.files {
            reporter.file_started(&FileProgress {
                name: &f.name,
                original_size: f.original_size,
                compressed_size: None,
            });
            reporter.file_finished(f);
        }
        reporter.finished(&r);

        // Assert
        let (out, err) = reporter.into_inner();
        let out = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(
            lines,
            vec![
                "RFLOGS_RUN_ID=1234abcd",
                "RFLOGS_OVERVIEW=https://rflogs.io/run-details.html?runId=1234abcd",
                "RFLOGS_LOG=https://rflogs.io/files/1234abcd/log.html",
                "RFLOGS_REPORT=https://rflogs.io/files/1234abcd/report.html",
            ]
        );
        assert!(err.is_empty());
    }

    #[test]
    fn interactive_mode_prints_lines_and_summary() {
        // Arrange
        let r = result(vec![
            FileOutcome {
                compressed_size: Some(819_200),
                original_size: Some(1_258_291),
                ..uploaded(FileRole::Output, "output.xml", 1_258_291)
            },
            uploaded(FileRole::Log, "log.html", 2048),
            uploaded(FileRole::Report, "report.html", 1024),
        ]);
        let mut reporter = InteractiveReporter::new(Vec::new(), Vec::new());

        // Act
        reporter.run_created(&r.run_id);
        for f in &r.files {
            reporter.file_started(&FileProgress {
                name: &f.name,
                original_size: f.original_size,
                compressed_size: f.compressed_size,
            });
            reporter.file_finished(f);
        }
        reporter.finished(&r);

        // Assert
        let (out, _) = reporter.into_inner();
        let out = String::from_utf8(out).unwrap();
        assert!(out.starts_with("Uploading results\n"));
        assert!(out.contains("output.xml"));
        assert!(out.contains("1.20 MB - compressed to 800.00 KB [OK]"));
        assert!(out.contains("Run ID: 1234abcd"));
        assert!(out.contains("Files:  3"));
        assert!(out.contains("Size:   803.00 KB"));
        assert!(out.contains("  Log:       https://rflogs.io/files/1234abcd/log.html"));
        assert!(out.contains("  Run:       https://rflogs.io/run-details.html?runId=1234abcd"));
        assert!(!out.contains("Upload incomplete"));
    }

    #[test]
    fn interactive_failure_goes_to_stderr_and_summary_flags_it() {
        // Arrange
        let failed = FileOutcome {
            status: FileStatus::Failed("server error 500: disk full".to_owned()),
            ..uploaded(FileRole::Report, "report.html", 10)
        };
        let r = result(vec![uploaded(FileRole::Log, "log.html", 20), failed]);
        let mut reporter = InteractiveReporter::new(Vec::new(), Vec::new());

        // Act
        reporter.file_started(&FileProgress {
            name: "report.html",
            original_size: Some(10),
            compressed_size: None,
        });
        reporter.file_finished(&r.files[1]);
        reporter.finished(&r);

        // Assert
        let (out, err) = reporter.into_inner();
        let out = String::from_utf8(out).unwrap();
        let err = String::from_utf8(err).unwrap();
        assert!(out.contains("[FAIL]"));
        assert!(out.contains("Upload incomplete: 1 of 2 files failed."));
        assert!(out.contains("Files:  1"));
        assert!(err.contains("Error uploading report.html: server error 500: disk full"));
    }

    #[test]
    fn other_html_files_get_sanitized_variable_names() {
        // Arrange
        let mut r = result(Vec::new());
        r.links.files.push(FileLink {
            role: FileRole::Other,
            label: "Custom-summary".to_owned(),
            url: "https://rflogs.io/files/x/custom-summary.html".to_owned(),
        });

        // Act
        let vars = ci_variables(&r);

        // Assert
        assert_eq!(vars.last().unwrap().0, "CUSTOM_SUMMARY");
    }

    #[test]
    fn step_summary_appends_links() {
        // Arrange
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("summary.md");
        std::fs::write(&path, "# Tests\n").unwrap();
        let r = result(Vec::new());

        // Act
        append_step_summary(&path, &r.links).unwrap();

        // Assert
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "# Tests\n[Log](https://rflogs.io/files/1234abcd/log.html) [Report](https://rflogs.io/files/1234abcd/report.html)\n"
        );
    }

    #[test]
    fn step_summary_without_html_links_points_to_run() {
        // Arrange
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("summary.md");
        let mut r = result(Vec::new());
        r.links.files.clear();

        // Act
        append_step_summary(&path, &r.links).unwrap();

        // Assert
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "[Results](https://rflogs.io/run-details.html?runId=1234abcd)\n"
        );
    }
}
