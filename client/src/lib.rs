#![warn(clippy::unwrap_in_result)]
#![warn(clippy::unwrap_used)]

use std::path::Path;
use std::time::Duration;

use body::file_part;
use kernel::{CreateRun, DeleteResult, Run, RunCreated, RunFile, RunList, RunSummary, UploadedFile};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use resource::Resource;

pub mod auth;
pub mod compress;
pub mod error;
pub mod locator;
pub mod report;
pub mod resource;
pub mod stats;
pub mod table;
pub mod upload;

mod body;

pub use auth::{Credential, FileTokenStore, TokenStore};
pub use compress::PreparedFile;
pub use error::{Error, Result};

pub const DEFAULT_BASE_URL: &str = "https://rflogs.io";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Remote operations the upload pipeline and commands rely on.
#[allow(async_fn_in_trait)]
pub trait Transfer {
    /// Service root used to build user facing links.
    fn base(&self) -> &Resource;

    async fn create_run(&self, request: &CreateRun) -> Result<String>;

    async fn upload_file(&self, run_id: &str, file: &PreparedFile) -> Result<UploadedFile>;

    async fn list_runs(&self) -> Result<Vec<RunSummary>>;

    async fn get_run(&self, run_id: &str) -> Result<Run>;

    /// Streams the content of `file` into a new file at `target` and
    /// returns the number of bytes written.
    async fn download_file(&self, file: &RunFile, target: &Path) -> Result<u64>;

    async fn delete_run(&self, run_id: &str) -> Result<DeleteResult>;
}

/// Authenticated HTTP client of the rflogs REST API.
pub struct ApiClient {
    http: Client,
    base: Resource,
    credential: Credential,
}

impl ApiClient {
    pub fn new(base_url: &str, credential: Credential, timeout: Duration) -> Result<Self> {
        let base = Resource::new(base_url)
            .ok_or_else(|| Error::Config(format!("invalid service URL '{base_url}'")))?;
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("rflogs/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(Error::Transport)?;
        Ok(Self {
            http,
            base,
            credential,
        })
    }

    fn runs(&self) -> Resource {
        self.base.join_path("api/runs")
    }

    fn run(&self, run_id: &str) -> Resource {
        let mut r = self.runs();
        r.append_segment(run_id);
        r
    }

    async fn send(&self, request: RequestBuilder, subject: &str) -> Result<Response> {
        let response = self.credential.apply(request).send().await?;
        check_status(response, subject).await
    }
}

impl Transfer for ApiClient {
    fn base(&self) -> &Resource {
        &self.base
    }

    async fn create_run(&self, request: &CreateRun) -> Result<String> {
        let url = self.runs();
        tracing::debug!("POST {url}");
        let response = self
            .send(self.http.post(url.to_string()).json(request), "run")
            .await?;
        let created: RunCreated = response.json().await?;
        tracing::info!("run {} created", created.run_id);
        Ok(created.run_id)
    }

    async fn upload_file(&self, run_id: &str, file: &PreparedFile) -> Result<UploadedFile> {
        let mut url = self.run(run_id);
        url.append_path("upload");

        let mut form = reqwest::multipart::Form::new().text("role", file.role.as_str());
        if file.is_compressed() {
            form = form.text("original_size", file.original_size.to_string());
        }
        form = form.part("file", file_part(file).await?);

        tracing::debug!("POST {url} ({} bytes)", file.transmitted_size());
        let subject = format!("run {run_id}");
        let response = self
            .send(self.http.post(url.to_string()).multipart(form), &subject)
            .await?;
        let uploaded: UploadedFile = response.json().await?;
        tracing::info!(
            "file: {} uploaded to run {run_id} file id: {}",
            file.name,
            uploaded.id
        );
        Ok(uploaded)
    }

    async fn list_runs(&self) -> Result<Vec<RunSummary>> {
        let url = self.runs();
        tracing::debug!("GET {url}");
        let response = self.send(self.http.get(url.to_string()), "runs").await?;
        let list: RunList = response.json().await?;
        Ok(list.runs)
    }

    async fn get_run(&self, run_id: &str) -> Result<Run> {
        let url = self.run(run_id);
        tracing::debug!("GET {url}");
        let subject = format!("run {run_id}");
        let response = self.send(self.http.get(url.to_string()), &subject).await?;
        let mut run: Run = response.json().await?;
        if run.id.is_empty() {
            run.id = run_id.to_owned();
        }
        Ok(run)
    }

    async fn download_file(&self, file: &RunFile, target: &Path) -> Result<u64> {
        let mut url = self.base.join_path("files");
        url.append_path(&file.path);
        tracing::debug!("GET {url}");
        let subject = format!("file {}", file.name);
        let response = self.send(self.http.get(url.to_string()), &subject).await?;

        let written = match body::save_stream(response.bytes_stream(), target).await {
            Ok(written) => written,
            Err(e) => {
                if let Err(removal) = tokio::fs::remove_file(target).await {
                    tracing::debug!("cannot remove partial {}: {removal}", target.display());
                }
                return Err(e);
            }
        };
        tracing::info!("file: {} downloaded. written: {written}", file.name);
        Ok(written)
    }

    async fn delete_run(&self, run_id: &str) -> Result<DeleteResult> {
        let url = self.run(run_id);
        tracing::debug!("DELETE {url}");
        let subject = format!("run {run_id}");
        let response = self
            .send(self.http.delete(url.to_string()), &subject)
            .await?;
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(DeleteResult::default());
        }
        serde_json::from_str(&text).map_err(|e| Error::Decode(e.to_string()))
    }
}

async fn check_status(response: Response, subject: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = server_message(&body);
    tracing::debug!("{subject}: HTTP {status}: {message}");
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::Unauthorized(if message.is_empty() {
            status.to_string()
        } else {
            message
        }),
        StatusCode::NOT_FOUND => Error::NotFound(subject.to_owned()),
        _ => Error::Server {
            status: status.as_u16(),
            message,
        },
    })
}

/// Extracts the human readable part of an error body.
fn server_message(body: &str) -> String {
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["detail", "error", "message"] {
            if let Some(serde_json::Value::String(s)) = map.get(key) {
                return s.clone();
            }
        }
    }
    body.trim().to_owned()
}

/// Content type sent for an uploaded file.
#[must_use]
pub fn mime_type(name: &str) -> &'static str {
    let extension = Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "xml" => "application/xml",
        "gz" => "application/gzip",
        "html" | "htm" => "text/html",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "webm" => "video/webm",
        "mp4" => "video/mp4",
        _ => "application/octet-stream",
    }
}
