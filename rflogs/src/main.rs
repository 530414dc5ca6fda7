use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::ArgMatches;
use cli::commands::{self, Status};
use cli::config::{self, FileConfig, Settings};
use cli::login::{self, LOGIN_TIMEOUT, Opener};
use cli::{Context, Environment};
use client::resource::Resource;
use client::{Error, FileTokenStore, report};
use tracing_subscriber::EnvFilter;

mod cli;

#[tokio::main]
async fn main() -> ExitCode {
    let matches = cli::build_cli().get_matches();
    init_logging(matches.get_flag("verbose"));

    let env = Environment::capture(|name| std::env::var(name).ok());
    match run(&matches, env).await {
        Ok(status) => ExitCode::from(status_code(status)),
        Err(e) => {
            tracing::debug!("{e:?}");
            eprintln!("Error: {e}");
            ExitCode::from(error_code(&e))
        }
    }
}

async fn run(matches: &ArgMatches, env: Environment) -> client::Result<Status> {
    if matches.subcommand_matches(cli::BUGREPORT_SUBCOMMAND).is_some() {
        cli::bugreport::run();
        return Ok(Status::Success);
    }

    if matches.subcommand_matches(cli::VERSION_SUBCOMMAND).is_some() {
        let settings = version_settings(matches, env);
        cli::version::run(&settings).map_err(|e| Error::io("<stdout>", e))?;
        return Ok(Status::Success);
    }

    let ctx = context(matches, env)?;
    match matches.subcommand() {
        Some((cli::UPLOAD_SUBCOMMAND, m)) => {
            let request = commands::upload_request(m, &ctx.settings)?;
            let api = ctx.api()?;
            let mut reporter = report::for_mode(ctx.env.mode);
            commands::upload(
                &api,
                &request,
                ctx.env.step_summary.as_deref(),
                reporter.as_mut(),
            )
            .await
        }
        Some((cli::LIST_SUBCOMMAND, _)) => commands::list(&ctx.api()?, &mut io::stdout()).await,
        Some((cli::INFO_SUBCOMMAND, m)) => {
            commands::info(&ctx.api()?, run_id(m)?, &mut io::stdout()).await
        }
        Some((cli::DOWNLOAD_SUBCOMMAND, m)) => {
            let output_dir = m
                .get_one::<PathBuf>("output-dir")
                .map_or(Path::new("."), PathBuf::as_path);
            commands::download(
                &ctx.api()?,
                run_id(m)?,
                output_dir,
                &mut io::stdout(),
                &mut io::stderr(),
            )
            .await
        }
        Some((cli::DELETE_SUBCOMMAND, m)) => {
            commands::delete(&ctx.api()?, run_id(m)?, &mut io::stdout(), &mut io::stderr()).await
        }
        Some((cli::LOGIN_SUBCOMMAND, m)) => {
            let base = Resource::new(&ctx.settings.base_url).ok_or_else(|| {
                Error::Config(format!("invalid service URL '{}'", ctx.settings.base_url))
            })?;
            let path = ctx.settings.credentials.clone().ok_or_else(|| {
                Error::Config("no configuration directory to store the login token".to_owned())
            })?;
            let store = FileTokenStore::new(path);
            let browser = |url: &str| open::that(url);
            let opener: Option<Opener<'_>> = if m.get_flag("no-browser") {
                None
            } else {
                Some(&browser)
            };
            login::login(&base, &store, opener, LOGIN_TIMEOUT, &mut io::stdout()).await
        }
        _ => Ok(Status::Success),
    }
}

fn context(matches: &ArgMatches, env: Environment) -> client::Result<Context> {
    let explicit = matches
        .get_one::<PathBuf>("config")
        .cloned()
        .or_else(|| env.config.clone());
    let file = match config::config_path(explicit.as_deref()) {
        Some(path) => FileConfig::load(&path, explicit.is_some())?,
        None => FileConfig::default(),
    };
    let settings = Settings::resolve(
        file,
        env.base_url.clone(),
        matches.get_one::<String>("base-url").cloned(),
    );
    tracing::debug!("service: {} mode: {:?}", settings.base_url, env.mode);
    Ok(Context { settings, env })
}

// a broken configuration file must not hide the version
fn version_settings(matches: &ArgMatches, env: Environment) -> Settings {
    let flag_base_url = matches.get_one::<String>("base-url").cloned();
    let env_base_url = env.base_url.clone();
    match context(matches, env) {
        Ok(ctx) => ctx.settings,
        Err(e) => {
            tracing::warn!("configuration ignored: {e}");
            Settings::resolve(FileConfig::default(), env_base_url, flag_base_url)
        }
    }
}

fn run_id(matches: &ArgMatches) -> client::Result<&str> {
    matches
        .get_one::<String>("run_id")
        .map(String::as_str)
        .ok_or_else(|| Error::Config("run identifier is required".to_owned()))
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("rflogs=debug,client=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rflogs=warn,client=warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn status_code(status: Status) -> u8 {
    match status {
        Status::Success => 0,
        Status::Failure => 1,
        Status::NotFound => 3,
    }
}

fn error_code(e: &Error) -> u8 {
    if e.is_config() {
        2
    } else if matches!(e, Error::NotFound(_)) {
        3
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Error::Config("missing key".to_owned()), 2)]
    #[case(Error::Unauthorized("invalid API key".to_owned()), 2)]
    #[case(Error::NotFound("run 1234abcd".to_owned()), 3)]
    #[case(Error::Server { status: 500, message: String::new() }, 1)]
    #[case(Error::UploadFailed { run_id: "1234abcd".to_owned() }, 1)]
    #[case(Error::NothingToUpload(PathBuf::from(".")), 1)]
    #[trace]
    fn error_code_tests(#[case] e: Error, #[case] expected: u8) {
        assert_eq!(error_code(&e), expected);
    }

    #[rstest]
    #[case(Status::Success, 0)]
    #[case(Status::Failure, 1)]
    #[case(Status::NotFound, 3)]
    #[trace]
    fn status_code_tests(#[case] status: Status, #[case] expected: u8) {
        assert_eq!(status_code(status), expected);
    }

    #[test]
    fn explicit_config_file_is_applied() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "base_url = \"https://file.example\"\nretries = 1\n").unwrap();
        let matches = cli::build_cli()
            .try_get_matches_from(["rflogs", "list", "--config", path.to_str().unwrap()])
            .unwrap();

        // Act
        let ctx = context(&matches, Environment::default()).unwrap();

        // Assert
        assert_eq!(ctx.settings.base_url, "https://file.example");
        assert_eq!(ctx.settings.retries, 1);
    }

    #[test]
    fn version_ignores_malformed_config_file() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "retries = \"three\"\n").unwrap();
        let env = Environment {
            config: Some(path),
            base_url: Some("https://env.example".to_owned()),
            ..Environment::default()
        };
        let matches = cli::build_cli()
            .try_get_matches_from(["rflogs", "version"])
            .unwrap();

        // Act
        let settings = version_settings(&matches, env);

        // Assert
        assert_eq!(settings.base_url, "https://env.example");
        assert_eq!(settings.retries, 0);
    }

    #[test]
    fn missing_explicit_config_file_fails() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let env = Environment {
            config: Some(dir.path().join("absent.toml")),
            ..Environment::default()
        };
        let matches = cli::build_cli()
            .try_get_matches_from(["rflogs", "list"])
            .unwrap();

        // Act
        let result = context(&matches, env);

        // Assert
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
