//! Resolves which local files belong to an upload.

use std::io;
use std::path::{Path, PathBuf};

use kernel::FileRole;

/// Filename override that excludes a role from the upload.
pub const SKIP: &str = "NONE";

pub const DEFAULT_OUTPUT: &str = "output.xml";
pub const DEFAULT_LOG: &str = "log.html";
pub const DEFAULT_REPORT: &str = "report.html";

const SCREENSHOT_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "svg", "webp"];
const VIDEO_EXTENSIONS: &[&str] = &["webm", "mp4"];

/// Role to filename mapping built once per invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPlan {
    output: Option<String>,
    log: Option<String>,
    report: Option<String>,
}

/// A file that exists and will be uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub role: FileRole,
    /// Name relative to the upload directory, `/` separated
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
}

/// A named role whose file could not be used.
#[derive(Debug)]
pub struct Missing {
    pub role: FileRole,
    pub name: String,
    pub path: PathBuf,
    pub error: io::Error,
}

#[derive(Debug)]
pub enum Located {
    Found(Candidate),
    Missing(Missing),
}

impl Located {
    #[must_use]
    pub fn candidate(&self) -> Option<&Candidate> {
        match self {
            Located::Found(c) => Some(c),
            Located::Missing(_) => None,
        }
    }
}

impl Default for UploadPlan {
    fn default() -> Self {
        Self::new(DEFAULT_OUTPUT, DEFAULT_LOG, DEFAULT_REPORT)
    }
}

impl UploadPlan {
    #[must_use]
    pub fn new(output: &str, log: &str, report: &str) -> Self {
        Self {
            output: selection(output),
            log: selection(log),
            report: selection(report),
        }
    }

    #[must_use]
    pub fn is_skipped(&self, role: FileRole) -> bool {
        self.name_of(role).is_none()
    }

    fn name_of(&self, role: FileRole) -> Option<&str> {
        match role {
            FileRole::Output => self.output.as_deref(),
            FileRole::Log => self.log.as_deref(),
            FileRole::Report => self.report.as_deref(),
            FileRole::Screenshot | FileRole::Other => None,
        }
    }

    /// Lists files to upload: output, log, report, then auxiliary
    /// artifacts found directly inside `dir`. Subdirectories are never
    /// scanned.
    #[must_use]
    pub fn locate(&self, dir: &Path) -> Vec<Located> {
        let mut located = Vec::new();
        for role in [FileRole::Output, FileRole::Log, FileRole::Report] {
            if let Some(name) = self.name_of(role) {
                located.push(locate_named(dir, role, name));
            }
        }

        let reserved = self.reserved_names();
        match auxiliary_files(dir, &reserved) {
            Ok(aux) => located.extend(aux.into_iter().map(Located::Found)),
            Err(e) => tracing::debug!("cannot scan {}: {e}", dir.display()),
        }
        located
    }

    // Names never picked up as auxiliary files, even when the role is skipped.
    fn reserved_names(&self) -> Vec<String> {
        let mut names: Vec<String> = [DEFAULT_OUTPUT, DEFAULT_LOG, DEFAULT_REPORT]
            .iter()
            .map(|s| (*s).to_owned())
            .collect();
        for name in [&self.output, &self.log, &self.report].into_iter().flatten() {
            if let Some(file_name) = Path::new(name).file_name() {
                names.push(file_name.to_string_lossy().into_owned());
            }
        }
        names
    }
}

fn selection(name: &str) -> Option<String> {
    if name.eq_ignore_ascii_case(SKIP) {
        None
    } else {
        Some(name.to_owned())
    }
}

fn locate_named(dir: &Path, role: FileRole, name: &str) -> Located {
    let path = dir.join(name);
    let name = name.replace('\\', "/");
    match std::fs::metadata(&path) {
        Ok(meta) if meta.is_file() => Located::Found(Candidate {
            role,
            name,
            path,
            size: meta.len(),
        }),
        Ok(_) => Located::Missing(Missing {
            role,
            name,
            path,
            error: io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
        }),
        Err(error) => Located::Missing(Missing {
            role,
            name,
            path,
            error,
        }),
    }
}

fn auxiliary_files(dir: &Path, reserved: &[String]) -> io::Result<Vec<Candidate>> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if !file_type.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') || reserved.iter().any(|r| r == &name) {
            continue;
        }
        let Some(role) = auxiliary_role(&name) else {
            continue;
        };
        let size = entry.metadata()?.len();
        found.push(Candidate {
            role,
            name,
            path: entry.path(),
            size,
        });
    }
    found.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(found)
}

fn auxiliary_role(name: &str) -> Option<FileRole> {
    let extension = Path::new(name)
        .extension()?
        .to_string_lossy()
        .to_ascii_lowercase();
    if SCREENSHOT_EXTENSIONS.contains(&extension.as_str()) {
        Some(FileRole::Screenshot)
    } else if VIDEO_EXTENSIONS.contains(&extension.as_str()) {
        Some(FileRole::Other)
    } else {
        None
    }
}
