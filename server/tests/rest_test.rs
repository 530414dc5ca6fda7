use kernel::{DeleteResult, Run, RunCreated, RunList, UploadedFile};
use reqwest::{Client, StatusCode, redirect};
use serde_json::json;
use server::{Running, ServerOptions};

const API_KEY: &str = "test-key";

struct ServerContext {
    server: Running,
    client: Client,
}

impl ServerContext {
    async fn setup(options: ServerOptions) -> ServerContext {
        let server = server::spawn(options.with_api_key(API_KEY)).await.unwrap();
        ServerContext {
            server,
            client: Client::new(),
        }
    }

    async fn teardown(self) {
        self.server.stop().await;
    }

    fn uri(&self, path: &str) -> String {
        format!("{}{path}", self.server.base_url())
    }

    async fn create_run(&self) -> String {
        let response = self
            .client
            .post(self.uri("/api/runs"))
            .header("X-API-Key", API_KEY)
            .json(&json!({"total_tests": 3, "passed": 3, "failed": 0, "tags": ["env:ci"]}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created: RunCreated = response.json().await.unwrap();
        created.run_id
    }

    async fn upload(&self, run_id: &str, name: &str, content: &[u8]) -> reqwest::Response {
        let part = reqwest::multipart::Part::bytes(content.to_vec()).file_name(name.to_owned());
        let form = reqwest::multipart::Form::new()
            .text("role", "log")
            .part("file", part);
        self.client
            .post(self.uri(&format!("/api/runs/{run_id}/upload")))
            .header("X-API-Key", API_KEY)
            .multipart(form)
            .send()
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn create_run_and_get_it() {
    // Arrange
    let ctx = ServerContext::setup(ServerOptions::default()).await;
    let run_id = ctx.create_run().await;

    // Act
    let result = ctx
        .client
        .get(ctx.uri(&format!("/api/runs/{run_id}")))
        .header("X-API-Key", API_KEY)
        .send()
        .await;

    // Assert
    match result {
        Ok(x) => {
            assert_eq!(x.status(), StatusCode::OK);
            let run: Run = x.json().await.unwrap();
            assert_eq!(run.id, run_id);
            assert_eq!(run.stats.total_tests, Some(3));
            assert_eq!(run.tags, vec!["env:ci".to_owned()]);
            assert!(run.files.is_empty());
        }
        Err(e) => {
            panic!("create_run_and_get_it error: {e}");
        }
    }
    ctx.teardown().await;
}

#[tokio::test]
async fn upload_then_download() {
    // Arrange
    let ctx = ServerContext::setup(ServerOptions::default()).await;
    let run_id = ctx.create_run().await;

    // Act
    let response = ctx.upload(&run_id, "log.html", b"<html></html>").await;

    // Assert
    assert_eq!(response.status(), StatusCode::CREATED);
    let uploaded: UploadedFile = response.json().await.unwrap();
    assert_eq!(uploaded.name, "log.html");
    assert_eq!(uploaded.size, Some(13));
    assert_eq!(uploaded.file_url, format!("/files/{run_id}/log.html"));

    let content = ctx
        .client
        .get(ctx.uri(&uploaded.file_url))
        .send()
        .await
        .unwrap();
    assert_eq!(content.status(), StatusCode::OK);
    assert_eq!(content.bytes().await.unwrap().as_ref(), b"<html></html>");
    ctx.teardown().await;
}

#[tokio::test]
async fn upload_into_unknown_run() {
    // Arrange
    let ctx = ServerContext::setup(ServerOptions::default()).await;

    // Act
    let response = ctx.upload("1234abcd", "log.html", b"x").await;

    // Assert
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    ctx.teardown().await;
}

#[tokio::test]
async fn injected_upload_failure() {
    // Arrange
    let ctx = ServerContext::setup(ServerOptions::default().failing_upload("report.html")).await;
    let run_id = ctx.create_run().await;

    // Act
    let failed = ctx.upload(&run_id, "report.html", b"r").await;
    let succeeded = ctx.upload(&run_id, "log.html", b"l").await;

    // Assert
    assert_eq!(failed.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: serde_json::Value = failed.json().await.unwrap();
    assert_eq!(body["detail"], "storage unavailable");
    assert_eq!(succeeded.status(), StatusCode::CREATED);
    ctx.teardown().await;
}

#[tokio::test]
async fn missing_credentials_rejected() {
    // Arrange
    let ctx = ServerContext::setup(ServerOptions::default()).await;

    // Act
    let result = ctx.client.get(ctx.uri("/api/runs")).send().await.unwrap();

    // Assert
    assert_eq!(result.status(), StatusCode::UNAUTHORIZED);
    ctx.teardown().await;
}

#[tokio::test]
async fn bearer_token_accepted() {
    // Arrange
    let ctx = ServerContext::setup(ServerOptions::default().with_token("t0ken")).await;

    // Act
    let result = ctx
        .client
        .get(ctx.uri("/api/runs"))
        .bearer_auth("t0ken")
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(result.status(), StatusCode::OK);
    ctx.teardown().await;
}

#[tokio::test]
async fn list_runs() {
    // Arrange
    let ctx = ServerContext::setup(ServerOptions::default()).await;
    let first = ctx.create_run().await;
    let second = ctx.create_run().await;

    // Act
    let result = ctx
        .client
        .get(ctx.uri("/api/runs"))
        .header("X-API-Key", API_KEY)
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(result.status(), StatusCode::OK);
    let list: RunList = result.json().await.unwrap();
    let ids: Vec<String> = list.runs.into_iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![first, second]);
    ctx.teardown().await;
}

#[tokio::test]
async fn delete_run() {
    // Arrange
    let ctx = ServerContext::setup(ServerOptions::default()).await;
    let run_id = ctx.create_run().await;
    ctx.upload(&run_id, "log.html", b"l").await;
    ctx.upload(&run_id, "report.html", b"r").await;

    // Act
    let result = ctx
        .client
        .delete(ctx.uri(&format!("/api/runs/{run_id}")))
        .header("X-API-Key", API_KEY)
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(result.status(), StatusCode::OK);
    let deleted: DeleteResult = result.json().await.unwrap();
    assert_eq!(deleted.files, 2);

    let again = ctx
        .client
        .delete(ctx.uri(&format!("/api/runs/{run_id}")))
        .header("X-API-Key", API_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(again.status(), StatusCode::NOT_FOUND);
    ctx.teardown().await;
}

#[tokio::test]
async fn cli_login_redirects_to_callback() {
    // Arrange
    let ctx = ServerContext::setup(ServerOptions::default().with_token("t0ken")).await;
    let client = Client::builder()
        .redirect(redirect::Policy::none())
        .build()
        .unwrap();

    // Act
    let result = client
        .get(ctx.uri("/cli-login?port=4567&state=abc"))
        .send()
        .await
        .unwrap();

    // Assert
    assert!(result.status().is_redirection());
    let location = result.headers()["location"].to_str().unwrap();
    assert_eq!(
        location,
        "http://127.0.0.1:4567/callback?token=t0ken&state=abc"
    );
    ctx.teardown().await;
}
