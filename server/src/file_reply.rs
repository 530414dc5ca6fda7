use axum::{
    body::Body,
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
};
use kernel::RunFile;

pub struct FileReply {
    data: Vec<u8>,
    file: RunFile,
}

impl FileReply {
    #[must_use]
    pub fn new(data: Vec<u8>, file: RunFile) -> Self {
        Self { data, file }
    }

    fn name_from_path(&self) -> &str {
        let path = &self.file.path;
        if let Some(ix) = path.rfind(['\\', '/']) {
            &path[ix + 1..]
        } else {
            path
        }
    }

    fn content_type(&self) -> &'static str {
        let name = self.name_from_path().to_ascii_lowercase();
        match name.rsplit_once('.').map(|(_, ext)| ext) {
            Some("html" | "htm") => "text/html; charset=utf-8",
            Some("xml") => "application/xml",
            Some("gz") => "application/gzip",
            Some("png") => "image/png",
            Some("jpg" | "jpeg") => "image/jpeg",
            _ => "application/octet-stream",
        }
    }
}

impl IntoResponse for FileReply {
    fn into_response(self) -> Response {
        let file_name = self.name_from_path().to_owned();
        let content_type = self.content_type();
        let len = self.data.len().to_string();
        let mut res = Body::from(self.data).into_response();
        res.headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        let attachment = format!(r#"inline; filename="{file_name}""#);
        if let Ok(val) = HeaderValue::from_str(attachment.as_str()) {
            res.headers_mut().insert(header::CONTENT_DISPOSITION, val);
        }
        if let Ok(val) = HeaderValue::from_str(len.as_str()) {
            res.headers_mut().insert(header::CONTENT_LENGTH, val);
        }

        res
    }
}
