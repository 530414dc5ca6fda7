//! Credentials attached to every API request.
//!
//! Two mutually exclusive sources exist: a long-lived API key taken from
//! the environment and a session token persisted by `rflogs login`. The
//! API key wins when both are present.

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use reqwest::RequestBuilder;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const API_KEY_ENV: &str = "RFLOGS_API_KEY";
pub const API_KEY_HEADER: &str = "X-API-Key";

#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    ApiKey(String),
    Token(String),
}

impl Credential {
    /// Picks the API key when given, otherwise the stored login token.
    pub fn resolve(api_key: Option<&str>, store: &impl TokenStore) -> Result<Self> {
        if let Some(key) = api_key.map(str::trim).filter(|k| !k.is_empty()) {
            return Ok(Credential::ApiKey(key.to_owned()));
        }
        match store.load()? {
            Some(token) => Ok(Credential::Token(token)),
            None => Err(Error::Config(format!(
                "{API_KEY_ENV} environment variable not set and no stored login found. \
                 Set {API_KEY_ENV} to your RF Logs API key or run `rflogs login`."
            ))),
        }
    }

    pub(crate) fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Credential::ApiKey(key) => request.header(API_KEY_HEADER, key),
            Credential::Token(token) => request.header(AUTHORIZATION, format!("Bearer {token}")),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::ApiKey(_) => f.write_str("ApiKey(***)"),
            Credential::Token(_) => f.write_str("Token(***)"),
        }
    }
}

/// Persistence for the browser login token.
pub trait TokenStore {
    fn load(&self) -> Result<Option<String>>;

    fn store(&self, token: &str) -> Result<()>;
}

/// No store at all, for hosts without a configuration directory.
impl<S: TokenStore> TokenStore for Option<S> {
    fn load(&self) -> Result<Option<String>> {
        match self {
            Some(store) => store.load(),
            None => Ok(None),
        }
    }

    fn store(&self, token: &str) -> Result<()> {
        match self {
            Some(store) => store.store(token),
            None => Err(Error::Config(
                "no configuration directory to store the login token".to_owned(),
            )),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct StoredCredentials {
    token: String,
}

/// Keeps the token in a TOML file readable only by the current user.
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path).map_err(|e| Error::io(&self.path, e))?;
        let stored: StoredCredentials = toml::from_str(&content).map_err(|e| {
            Error::Config(format!("malformed credentials file {}: {e}", self.path.display()))
        })?;
        let token = stored.token.trim().to_owned();
        Ok((!token.is_empty()).then_some(token))
    }

    fn store(&self, token: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        let content = toml::to_string_pretty(&StoredCredentials {
            token: token.to_owned(),
        })
        .map_err(|e| Error::Config(e.to_string()))?;
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&self.path).map_err(|e| Error::io(&self.path, e))?;

        // the mode above only applies to newly created files
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600))
                .map_err(|e| Error::io(&self.path, e))?;
        }
        file.write_all(content.as_bytes())
            .map_err(|e| Error::io(&self.path, e))?;

        tracing::debug!(path = %self.path.display(), "login token saved");
        Ok(())
    }
}
