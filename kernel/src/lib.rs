#![warn(clippy::unwrap_in_result)]
#![warn(clippy::unwrap_used)]

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};

mod tag;

pub use tag::{Tag, TagError};

/// Logical category of a file inside a run.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FileRole {
    /// Robot Framework `output.xml`
    Output,
    /// HTML log
    Log,
    /// HTML report
    Report,
    /// Image captured during the run
    Screenshot,
    /// Any other auxiliary artifact such as a video
    Other,
}

impl FileRole {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            FileRole::Output => "output",
            FileRole::Log => "log",
            FileRole::Report => "report",
            FileRole::Screenshot => "screenshot",
            FileRole::Other => "other",
        }
    }
}

impl fmt::Display for FileRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "output" => Ok(FileRole::Output),
            "log" => Ok(FileRole::Log),
            "report" => Ok(FileRole::Report),
            "screenshot" => Ok(FileRole::Screenshot),
            "other" => Ok(FileRole::Other),
            _ => Err(format!("unknown file role '{s}'")),
        }
    }
}

/// Overall outcome of a test execution.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Fail,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pass => f.write_str("pass"),
            Verdict::Fail => f.write_str("fail"),
        }
    }
}

/// Test statistics extracted from `output.xml`.
///
/// Every field is optional: when the output file is skipped or cannot be
/// parsed the run is still created, just without statistics.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct RunStats {
    pub total_tests: Option<u32>,
    pub passed: Option<u32>,
    pub failed: Option<u32>,
    pub skipped: Option<u32>,
    pub verdict: Option<Verdict>,
    pub start_time: Option<NaiveDateTime>,
    pub end_time: Option<NaiveDateTime>,
}

/// Body of the create-run call.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct CreateRun {
    #[serde(flatten)]
    pub stats: RunStats,
    /// Tags in wire form, see [`Tag::to_wire`]
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Reply of the create-run call.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RunCreated {
    pub run_id: String,
}

/// Reply of a single file upload.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UploadedFile {
    /// Server assigned file identifier
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Number of bytes the server stored
    #[serde(default)]
    pub size: Option<u64>,
    /// Path of the stored file relative to the service root
    pub file_url: String,
}

/// A file stored inside a run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RunFile {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub name: String,
    /// Storage path used to download the file
    #[serde(default)]
    pub path: String,
    /// Original size in bytes
    #[serde(default)]
    pub size: u64,
    /// Size in bytes of the compressed representation, when compressed
    #[serde(default)]
    pub compressed_size: Option<u64>,
    #[serde(default)]
    pub role: Option<FileRole>,
}

impl RunFile {
    /// Number of bytes actually transmitted and stored for this file.
    #[must_use]
    pub fn transmitted_size(&self) -> u64 {
        self.compressed_size.unwrap_or(self.size)
    }
}

/// Full description of a run.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Run {
    #[serde(default, alias = "run_id")]
    pub id: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub files: Vec<RunFile>,
    #[serde(flatten)]
    pub stats: RunStats,
}

impl Run {
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Sum of transmitted sizes over all files of the run.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(RunFile::transmitted_size).sum()
    }
}

/// One entry of the run listing.
///
/// The listing endpoint may return either bare run identifiers or summary
/// objects, both forms decode into this type.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(from = "RunEntry")]
pub struct RunSummary {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RunEntry {
    Id(String),
    Summary {
        #[serde(alias = "run_id")]
        id: String,
        #[serde(default)]
        created_at: Option<String>,
        #[serde(default)]
        verdict: Option<Verdict>,
        #[serde(default)]
        file_count: Option<usize>,
        #[serde(default)]
        tags: Vec<String>,
    },
}

impl From<RunEntry> for RunSummary {
    fn from(entry: RunEntry) -> Self {
        match entry {
            RunEntry::Id(id) => RunSummary {
                id,
                ..RunSummary::default()
            },
            RunEntry::Summary {
                id,
                created_at,
                verdict,
                file_count,
                tags,
            } => RunSummary {
                id,
                created_at,
                verdict,
                file_count,
                tags,
            },
        }
    }
}

/// Reply of the list-runs call.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct RunList {
    #[serde(default)]
    pub runs: Vec<RunSummary>,
}

/// Result of a delete operation showing the number of items removed.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct DeleteResult {
    /// Number of files removed together with the run
    #[serde(default)]
    pub files: usize,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(i64),
    }

    match Id::deserialize(deserializer)? {
        Id::Text(s) => Ok(s),
        Id::Number(n) => Ok(n.to_string()),
    }
}
