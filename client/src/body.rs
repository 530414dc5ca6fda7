use std::path::Path;

use futures::{Stream, StreamExt};
use reqwest::multipart::Part;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

use crate::compress::PreparedFile;
use crate::error::{Error, Result};
use crate::mime_type;

/// Streams the prepared file from disk as a multipart part.
pub(crate) async fn file_part(file: &PreparedFile) -> Result<Part> {
    let path = file.path();
    let f = File::open(path).await.map_err(|e| Error::io(path, e))?;
    let len = f.metadata().await.map_err(|e| Error::io(path, e))?.len();
    let stream = ReaderStream::new(f);
    let body = reqwest::Body::wrap_stream(stream);
    let part = Part::stream_with_length(body, len)
        .file_name(file.name.clone())
        .mime_str(mime_type(&file.name))?;
    Ok(part)
}

/// Writes a response body to `target` chunk by chunk.
pub(crate) async fn save_stream<S, B>(stream: S, target: &Path) -> Result<u64>
where
    S: Stream<Item = reqwest::Result<B>>,
    B: AsRef<[u8]>,
{
    let mut stream = std::pin::pin!(stream);
    let mut f = File::create(target).await.map_err(|e| Error::io(target, e))?;
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        let chunk = chunk.as_ref();
        f.write_all(chunk).await.map_err(|e| Error::io(target, e))?;
        written += chunk.len() as u64;
    }
    f.flush().await.map_err(|e| Error::io(target, e))?;
    Ok(written)
}
