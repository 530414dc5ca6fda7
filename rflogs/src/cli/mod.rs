use std::path::PathBuf;

use clap::{Command, arg, command, crate_name, value_parser};
use client::auth::API_KEY_ENV;
use client::report::OutputMode;
use client::{ApiClient, Credential, FileTokenStore, Result};

pub mod bugreport;
pub mod commands;
pub mod config;
pub mod login;
pub mod version;

use config::Settings;

pub const VERSION_SUBCOMMAND: &str = "version";
pub const VERSION_DESCRIPTION: &str = "Display the version and build information";

pub const BUGREPORT_SUBCOMMAND: &str = "bugreport";
pub const BUGREPORT_DESCRIPTION: &str = "Collect information about the system and the environment that could be useful for bug reports";

pub const UPLOAD_SUBCOMMAND: &str = "upload";
pub const UPLOAD_DESCRIPTION: &str = "Upload Robot Framework test results";

pub const LIST_SUBCOMMAND: &str = "list";
pub const LIST_DESCRIPTION: &str = "List runs";

pub const INFO_SUBCOMMAND: &str = "info";
pub const INFO_DESCRIPTION: &str = "Show details of a run";

pub const DOWNLOAD_SUBCOMMAND: &str = "download";
pub const DOWNLOAD_DESCRIPTION: &str = "Download all files of a run";

pub const DELETE_SUBCOMMAND: &str = "delete";
pub const DELETE_DESCRIPTION: &str = "Delete a run with all its files";

pub const LOGIN_SUBCOMMAND: &str = "login";
pub const LOGIN_DESCRIPTION: &str = "Log in through the browser and store the session token";

pub const BASE_URL_ENV: &str = "RFLOGS_BASE_URL";
pub const CONFIG_ENV: &str = "RFLOGS_CONFIG";

const GITHUB_ACTIONS_ENV: &str = "GITHUB_ACTIONS";
const STEP_SUMMARY_ENV: &str = "GITHUB_STEP_SUMMARY";

pub fn build_cli() -> Command {
    command!(crate_name!())
        .version(clap::crate_version!())
        .about(clap::crate_description!())
        .after_help("For more information, visit https://rflogs.io")
        .arg(
            arg!(--"base-url" <URL>)
                .global(true)
                .help(format!("Service URL [env: {BASE_URL_ENV}] [default: {}]", ::client::DEFAULT_BASE_URL)),
        )
        .arg(
            arg!(--config <FILE>)
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help(format!("Configuration file [env: {CONFIG_ENV}]")),
        )
        .arg(arg!(--verbose "Print debug logs to stderr").global(true))
        .subcommand(Command::new(VERSION_SUBCOMMAND).about(VERSION_DESCRIPTION))
        .subcommand(Command::new(BUGREPORT_SUBCOMMAND).about(BUGREPORT_DESCRIPTION))
        .subcommand(
            Command::new(UPLOAD_SUBCOMMAND)
                .about(UPLOAD_DESCRIPTION)
                .arg(
                    arg!([directory] "Directory containing test results")
                        .value_parser(value_parser!(PathBuf))
                        .default_value("."),
                )
                .arg(
                    arg!(-o --output <FILE>)
                        .help("XML output file. Use NONE to disable upload. Default: output.xml"),
                )
                .arg(
                    arg!(-l --log <FILE>)
                        .help("HTML log file. Use NONE to disable upload. Default: log.html"),
                )
                .arg(
                    arg!(-r --report <FILE>)
                        .help("HTML report file. Use NONE to disable upload. Default: report.html"),
                )
                .arg(
                    arg!(-t --tag <TAG>)
                        .action(clap::ArgAction::Append)
                        .help("Tag(s) to associate with the run, e.g., -t env:windows -t regression"),
                )
                .arg(
                    arg!(--retries <N>)
                        .value_parser(value_parser!(u32))
                        .help("How many times a failed file upload is repeated. Default: 0"),
                ),
        )
        .subcommand(Command::new(LIST_SUBCOMMAND).about(LIST_DESCRIPTION))
        .subcommand(
            Command::new(INFO_SUBCOMMAND)
                .about(INFO_DESCRIPTION)
                .arg(arg!(<run_id> "Run ID to get information for")),
        )
        .subcommand(
            Command::new(DOWNLOAD_SUBCOMMAND)
                .about(DOWNLOAD_DESCRIPTION)
                .arg(arg!(<run_id> "Run ID to download"))
                .arg(
                    arg!(-d --"output-dir" <DIR> "Directory to save downloaded files")
                        .value_parser(value_parser!(PathBuf))
                        .default_value("."),
                ),
        )
        .subcommand(
            Command::new(DELETE_SUBCOMMAND)
                .about(DELETE_DESCRIPTION)
                .arg(arg!(<run_id> "Run ID to delete")),
        )
        .subcommand(
            Command::new(LOGIN_SUBCOMMAND)
                .about(LOGIN_DESCRIPTION)
                .arg(arg!(--"no-browser" "Print the login URL without opening a browser")),
        )
        .arg_required_else_help(true)
}

/// The environment variables the commands look at, read once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub config: Option<PathBuf>,
    /// Step summary file, only under GitHub Actions
    pub step_summary: Option<PathBuf>,
    pub mode: OutputMode,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            config: None,
            step_summary: None,
            mode: OutputMode::Interactive,
        }
    }
}

impl Environment {
    pub fn capture<F>(var: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let github_actions = var(GITHUB_ACTIONS_ENV).is_some_and(|v| v == "true");
        Self {
            api_key: var(API_KEY_ENV),
            base_url: var(BASE_URL_ENV),
            config: var(CONFIG_ENV).filter(|v| !v.is_empty()).map(PathBuf::from),
            step_summary: var(STEP_SUMMARY_ENV)
                .filter(|v| github_actions && !v.is_empty())
                .map(PathBuf::from),
            mode: OutputMode::detect(&var),
        }
    }
}

/// Everything a command needs, resolved once per invocation.
pub struct Context {
    pub settings: Settings,
    pub env: Environment,
}

impl Context {
    /// API key from the environment, else the token stored by `login`.
    pub fn credential(&self) -> Result<Credential> {
        let store = self.settings.credentials.as_ref().map(FileTokenStore::new);
        Credential::resolve(self.env.api_key.as_deref(), &store)
    }

    pub fn api(&self) -> Result<ApiClient> {
        ApiClient::new(
            &self.settings.base_url,
            self.credential()?,
            self.settings.timeout,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::client::{Error, TokenStore};
    use std::collections::HashMap;

    fn capture(vars: &[(&str, &str)]) -> Environment {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        Environment::capture(|k| map.get(k).cloned())
    }

    fn context(env: Environment, credentials: Option<PathBuf>) -> Context {
        Context {
            settings: Settings {
                credentials,
                ..Settings::default()
            },
            env,
        }
    }

    #[test]
    fn cli_definition_is_consistent() {
        build_cli().debug_assert();
    }

    #[test]
    fn global_flags_after_subcommand() {
        // Act
        let m = build_cli()
            .try_get_matches_from(["rflogs", "list", "--base-url", "http://localhost:5000", "--verbose"])
            .unwrap();

        // Assert
        assert!(m.get_flag("verbose"));
        assert_eq!(
            m.get_one::<String>("base-url").map(String::as_str),
            Some("http://localhost:5000")
        );
    }

    #[test]
    fn step_summary_only_under_github_actions() {
        // Act
        let plain = capture(&[("GITHUB_STEP_SUMMARY", "/tmp/summary.md")]);
        let github = capture(&[
            ("GITHUB_STEP_SUMMARY", "/tmp/summary.md"),
            ("GITHUB_ACTIONS", "true"),
        ]);

        // Assert
        assert_eq!(plain.step_summary, None);
        assert_eq!(github.step_summary, Some(PathBuf::from("/tmp/summary.md")));
        assert_eq!(github.mode, OutputMode::Ci);
        assert_eq!(plain.mode, OutputMode::Interactive);
    }

    #[test]
    fn api_key_wins_over_stored_token() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.toml");
        FileTokenStore::new(&path).store("t0ken").unwrap();
        let ctx = context(capture(&[("RFLOGS_API_KEY", "key")]), Some(path));

        // Act
        let credential = ctx.credential().unwrap();

        // Assert
        assert_eq!(credential, Credential::ApiKey("key".to_owned()));
    }

    #[test]
    fn stored_token_used_without_api_key() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.toml");
        FileTokenStore::new(&path).store("t0ken").unwrap();
        let ctx = context(Environment::default(), Some(path));

        // Act
        let credential = ctx.credential().unwrap();

        // Assert
        assert_eq!(credential, Credential::Token("t0ken".to_owned()));
    }

    #[test]
    fn api_key_works_without_config_directory() {
        // Arrange
        let ctx = context(capture(&[("RFLOGS_API_KEY", " key ")]), None);

        // Act
        let credential = ctx.credential().unwrap();

        // Assert
        assert_eq!(credential, Credential::ApiKey("key".to_owned()));
    }

    #[test]
    fn no_credential_is_config_error() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(
            capture(&[("RFLOGS_API_KEY", "  ")]),
            Some(dir.path().join("credentials.toml")),
        );

        // Act
        let result = ctx.credential();

        // Assert
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
