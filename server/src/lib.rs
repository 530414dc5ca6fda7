use std::collections::HashSet;
use std::env;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::{DefaultBodyLimit, Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};
use futures::lock::Mutex;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::{
    classify::ServerErrorsFailureClass, limit::RequestBodyLimitLayer, trace::TraceLayer,
};
use tracing::Span;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod domain;
pub mod file_reply;
mod handlers;
pub mod memory;

use crate::memory::Memory;

pub const API_KEY_HEADER: &str = "X-API-Key";

type Database = Arc<Mutex<Memory>>;

/// Accepted credentials and injected faults of a server instance.
#[derive(Debug, Clone, Default)]
pub struct ServerOptions {
    /// Accepted `X-API-Key` value
    pub api_key: Option<String>,
    /// Accepted bearer token, also handed out by the login page
    pub token: Option<String>,
    /// File names whose upload fails with an internal server error
    pub fail_uploads: HashSet<String>,
}

impl ServerOptions {
    #[must_use]
    pub fn with_api_key(mut self, key: &str) -> Self {
        self.api_key = Some(key.to_owned());
        self
    }

    #[must_use]
    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_owned());
        self
    }

    #[must_use]
    pub fn failing_upload(mut self, name: &str) -> Self {
        self.fail_uploads.insert(name.to_owned());
        self
    }

    fn accepts(&self, headers: &HeaderMap) -> bool {
        if self.api_key.is_none() && self.token.is_none() {
            return true;
        }
        let key = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok());
        if key.is_some() && key == self.api_key.as_deref() {
            return true;
        }
        let bearer = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        bearer.is_some() && bearer == self.token.as_deref()
    }
}

#[derive(Clone)]
pub(crate) struct AppState {
    storage: Database,
    options: Arc<ServerOptions>,
}

/// Starts a server from environment configuration and serves until a signal arrives.
pub async fn run() -> io::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            env::var("RUST_LOG").unwrap_or_else(|_| "server=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Configuration from environment
    let port = env::var("RFLOGS_SERVER_PORT").unwrap_or_else(|_| String::from("5000"));
    let options = ServerOptions {
        api_key: env::var("RFLOGS_SERVER_API_KEY").ok(),
        token: env::var("RFLOGS_SERVER_TOKEN").ok(),
        fail_uploads: HashSet::new(),
    };

    let socket: SocketAddr = format!("0.0.0.0:{port}")
        .parse()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let listener = TcpListener::bind(socket).await?;
    tracing::debug!("listening on {socket}");

    axum::serve(listener, create_routes(options))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

pub fn create_routes(options: ServerOptions) -> Router {
    let state = AppState {
        storage: Arc::new(Mutex::new(Memory::new())),
        options: Arc::new(options),
    };

    let api = Router::new()
        .route("/api/runs", post(handlers::create_run).get(handlers::get_runs))
        .route(
            "/api/runs/:run_id",
            get(handlers::get_run).delete(handlers::delete_run),
        )
        .route("/api/runs/:run_id/upload", post(handlers::upload_file))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_credential,
        ));

    Router::new()
        .merge(api)
        .route("/files/*path", get(handlers::get_file_content))
        .route("/cli-login", get(handlers::cli_login))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http().on_failure(
                    |error: ServerErrorsFailureClass, _latency: Duration, _span: &Span| {
                        tracing::error!("Server error: {error}");
                    },
                ))
                .layer(DefaultBodyLimit::disable())
                .layer(RequestBodyLimitLayer::new(
                    512 * 1024 * 1024, /* 512MB */
                ))
                .into_inner(),
        )
        .with_state(state)
}

async fn require_credential(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if state.options.accepts(request.headers()) {
        next.run(request).await
    } else {
        tracing::info!("{} {} rejected: invalid credentials", request.method(), request.uri());
        handlers::detail(StatusCode::UNAUTHORIZED, "Invalid API key")
    }
}

/// Server bound to an ephemeral local port, stopped by [`Running::stop`].
pub struct Running {
    addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    join: JoinHandle<io::Result<()>>,
}

impl Running {
    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub async fn stop(self) {
        self.shutdown.send(()).unwrap_or_default();
        if let Ok(Err(e)) = self.join.await {
            tracing::error!("server stopped with error: {e}");
        }
    }
}

/// Serves [`create_routes`] on `127.0.0.1` with a port chosen by the OS.
pub async fn spawn(options: ServerOptions) -> io::Result<Running> {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
    let addr = listener.local_addr()?;
    let (send, recv) = oneshot::channel::<()>();
    let app = create_routes(options);
    let join = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                recv.await.unwrap_or_default();
            })
            .await
    });
    tracing::debug!("listening on {addr}");
    Ok(Running {
        addr,
        shutdown: send,
        join,
    })
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("signal received, starting graceful shutdown");
}
