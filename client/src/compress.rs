//! Gzip compression of large output files.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;
use kernel::FileRole;
use tempfile::NamedTempFile;

use crate::locator::Candidate;

/// Output files strictly larger than this are compressed (1 MiB).
pub const COMPRESSION_THRESHOLD: u64 = 1024 * 1024;

const GZIP_SUFFIX: &str = ".gz";

/// A file ready to be sent, possibly backed by a compressed temporary copy.
///
/// The temporary copy lives as long as this value.
#[derive(Debug)]
pub struct PreparedFile {
    pub role: FileRole,
    /// Name the server stores the file under
    pub name: String,
    pub original_size: u64,
    pub compressed_size: Option<u64>,
    path: PathBuf,
    _compressed: Option<NamedTempFile>,
}

impl PreparedFile {
    #[must_use]
    pub fn uncompressed(candidate: &Candidate) -> Self {
        Self {
            role: candidate.role,
            name: candidate.name.clone(),
            original_size: candidate.size,
            compressed_size: None,
            path: candidate.path.clone(),
            _compressed: None,
        }
    }

    /// Location of the bytes to transmit.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn transmitted_size(&self) -> u64 {
        self.compressed_size.unwrap_or(self.original_size)
    }

    #[must_use]
    pub fn is_compressed(&self) -> bool {
        self.compressed_size.is_some()
    }
}

#[must_use]
pub fn needs_compression(role: FileRole, size: u64) -> bool {
    role == FileRole::Output && size > COMPRESSION_THRESHOLD
}

/// Compresses the candidate when required.
///
/// A compression failure is returned next to the uncompressed fallback so
/// the caller can warn and still upload the original file.
pub fn prepare(candidate: &Candidate) -> (PreparedFile, Option<io::Error>) {
    if !needs_compression(candidate.role, candidate.size) {
        return (PreparedFile::uncompressed(candidate), None);
    }
    match gzip_to_temp(&candidate.path) {
        Ok(temp) => {
            let size = match temp.as_file().metadata() {
                Ok(m) => m.len(),
                Err(e) => return (PreparedFile::uncompressed(candidate), Some(e)),
            };
            tracing::debug!(
                "{} compressed from {} to {size} bytes",
                candidate.name,
                candidate.size
            );
            let prepared = PreparedFile {
                role: candidate.role,
                name: format!("{}{GZIP_SUFFIX}", candidate.name),
                original_size: candidate.size,
                compressed_size: Some(size),
                path: temp.path().to_path_buf(),
                _compressed: Some(temp),
            };
            (prepared, None)
        }
        Err(e) => (PreparedFile::uncompressed(candidate), Some(e)),
    }
}

fn gzip_to_temp(source: &Path) -> io::Result<NamedTempFile> {
    let mut reader = BufReader::new(File::open(source)?);
    let temp = tempfile::Builder::new()
        .prefix("rflogs-")
        .suffix(GZIP_SUFFIX)
        .tempfile()?;
    {
        let mut encoder = GzEncoder::new(BufWriter::new(temp.as_file()), Compression::default());
        io::copy(&mut reader, &mut encoder)?;
        let mut writer = encoder.finish()?;
        writer.flush()?;
    }
    Ok(temp)
}
