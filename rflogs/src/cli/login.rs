//! Browser based login.
//!
//! A one-shot HTTP listener on the loopback interface receives the token
//! the service redirects to after the user signs in. The random `state`
//! sent with the login URL must come back unchanged.

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use client::resource::Resource;
use client::{Error, Result, TokenStore};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, oneshot};
use uuid::Uuid;

use super::commands::Status;

pub const LOGIN_TIMEOUT: Duration = Duration::from_secs(5 * 60);

const CALLBACK_PATH: &str = "/callback";
const SUCCESS_PAGE: &str =
    "<html><body><h1>Login successful</h1><p>You can close this window and return to the terminal.</p></body></html>";
const FAILURE_PAGE: &str =
    "<html><body><h1>Login failed</h1><p>The login was cancelled or did not match. Run <code>rflogs login</code> again.</p></body></html>";

#[derive(Deserialize)]
struct CallbackQuery {
    token: Option<String>,
    state: Option<String>,
}

enum Callback {
    Token(String),
    /// Right state but no token, the user did not sign in
    Declined,
    StateMismatch,
}

struct Pending {
    state: String,
    reply: Mutex<Option<oneshot::Sender<Callback>>>,
}

/// Opens an URL in the user's browser.
pub type Opener<'a> = &'a dyn Fn(&str) -> io::Result<()>;

pub async fn login<S, W>(
    base: &Resource,
    store: &S,
    opener: Option<Opener<'_>>,
    timeout: Duration,
    out: &mut W,
) -> Result<Status>
where
    S: TokenStore,
    W: Write,
{
    let listener = TcpListener::bind(("127.0.0.1", 0))
        .await
        .map_err(|e| Error::io("127.0.0.1", e))?;
    let port = listener
        .local_addr()
        .map_err(|e| Error::io("127.0.0.1", e))?
        .port();

    let state = Uuid::new_v4().simple().to_string();
    let (send, recv) = oneshot::channel();
    let pending = Arc::new(Pending {
        state: state.clone(),
        reply: Mutex::new(Some(send)),
    });
    let app = Router::new()
        .route(CALLBACK_PATH, get(callback))
        .with_state(pending);

    let (stop, stopped) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                stopped.await.unwrap_or_default();
            })
            .await
    });
    tracing::debug!("login callback listening on 127.0.0.1:{port}");

    let mut url = base.join_path("cli-login");
    url.append_query("port", &port.to_string())
        .append_query("state", &state);

    writeln!(out, "Opening browser to log in: {url}").map_err(|e| Error::io("<stdout>", e))?;
    writeln!(out, "If the browser does not open, visit the URL above.")
        .map_err(|e| Error::io("<stdout>", e))?;
    if let Some(open) = opener {
        if let Err(e) = open(url.as_url().as_str()) {
            tracing::warn!("cannot open browser: {e}");
        }
    }

    let received = tokio::time::timeout(timeout, recv).await;

    stop.send(()).unwrap_or_default();
    if tokio::time::timeout(Duration::from_secs(2), server).await.is_err() {
        tracing::debug!("login callback server did not stop in time");
    }

    let token = match received {
        Err(_) => {
            return Err(Error::Unauthorized(format!(
                "no login received within {} seconds",
                timeout.as_secs()
            )));
        }
        Ok(Err(_)) => return Err(Error::Unauthorized("login aborted".to_owned())),
        Ok(Ok(Callback::StateMismatch)) => {
            return Err(Error::Unauthorized(
                "login state mismatch, the callback was not issued for this login".to_owned(),
            ));
        }
        Ok(Ok(Callback::Declined)) => {
            return Err(Error::Unauthorized(
                "login cancelled, no token was received".to_owned(),
            ));
        }
        Ok(Ok(Callback::Token(token))) => token,
    };

    store.store(&token)?;
    writeln!(out, "Login successful.").map_err(|e| Error::io("<stdout>", e))?;
    Ok(Status::Success)
}

async fn callback(
    State(pending): State<Arc<Pending>>,
    Query(query): Query<CallbackQuery>,
) -> (StatusCode, Html<&'static str>) {
    let outcome = if query.state.as_deref() != Some(pending.state.as_str()) {
        Callback::StateMismatch
    } else {
        match query.token.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            Some(token) => Callback::Token(token.to_owned()),
            None => Callback::Declined,
        }
    };
    let accepted = matches!(outcome, Callback::Token(_));
    if let Some(reply) = pending.reply.lock().await.take() {
        if reply.send(outcome).is_err() {
            tracing::debug!("login callback arrived after the wait ended");
        }
    }
    if accepted {
        (StatusCode::OK, Html(SUCCESS_PAGE))
    } else {
        (StatusCode::BAD_REQUEST, Html(FAILURE_PAGE))
    }
}
