//! aerial: operator commands for the Aerial end-to-end suite
//!
//! ## Usage
//!
//! ```bash
//! aerial env                      # Resolved configuration, secrets masked
//! aerial env --check              # Fail unless a live browser run can start
//! aerial session                  # Log in via the API, write .auth/session.json
//! aerial session --via ui         # Log in through the login page (browser feature)
//! aerial vcm length <content-id>  # Probe the volume service
//! ```

mod commands;
mod error;

use aerial_e2e::config::{Credentials, Env};
use aerial_e2e::driver::{OriginStorage, StorageEntry, StorageState};
use aerial_e2e::service::vcm::{self, ContentLengthResponse};
use aerial_e2e::service::{auth, decode_json, ApiClient};
use clap::Parser;
use commands::{Cli, Commands, EnvArgs, LoginVia, SessionArgs, VcmArgs, VcmCommand};
use error::{CliError, CliResult};
use std::process::ExitCode;
use std::sync::Arc;

/// localStorage key the web app reads its bearer token from
const TOKEN_STORAGE_KEY: &str = "token";

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();
    aerial_e2e::logging::init_stderr(cli.log_filter(), cli.json_logs);

    match cli.command {
        Commands::Env(args) => run_env(&args),
        Commands::Session(args) => run_session(&args),
        Commands::Vcm(args) => run_vcm(&args),
    }
}

fn runtime() -> CliResult<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new()
        .map_err(|e| CliError::config(format!("failed to start async runtime: {e}")))
}

// =============================================================================
// env
// =============================================================================

fn run_env(args: &EnvArgs) -> CliResult<()> {
    let env = Env::from_env();
    if args.check {
        env.require_live()?;
    }
    let rendered = render_env(&env, args.json)?;
    if rendered.is_empty() {
        eprintln!("No recognized variables are set");
    } else {
        println!("{rendered}");
    }
    Ok(())
}

fn render_env(env: &Env, json: bool) -> CliResult<String> {
    let vars = env.redacted();
    if json {
        let object: serde_json::Map<String, serde_json::Value> = vars
            .into_iter()
            .map(|(k, v)| (k, serde_json::Value::String(v)))
            .collect();
        return Ok(serde_json::to_string_pretty(&object)?);
    }
    Ok(vars
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("\n"))
}

// =============================================================================
// session
// =============================================================================

fn run_session(args: &SessionArgs) -> CliResult<()> {
    let env = Arc::new(Env::from_env());
    let credentials = env.credentials(args.role.into())?;
    let rt = runtime()?;

    let state = match args.via {
        LoginVia::Api => rt.block_on(api_session(&env, &credentials))?,
        LoginVia::Ui => rt.block_on(ui_session(Arc::clone(&env), &credentials, args.headed))?,
    };
    state.save(&args.out)?;
    tracing::info!(path = %args.out.display(), email = %credentials.email, "stored session");
    println!("Wrote {}", args.out.display());
    Ok(())
}

async fn api_session(env: &Env, credentials: &Credentials) -> CliResult<StorageState> {
    let api = ApiClient::new(env.backend_url()?)?;
    let token = auth::token(&api, credentials).await?;
    Ok(token_storage_state(&env.base_url()?, &token))
}

#[cfg(feature = "browser")]
async fn ui_session(
    env: Arc<Env>,
    credentials: &Credentials,
    headed: bool,
) -> CliResult<StorageState> {
    use aerial_e2e::config::DriverConfig;
    use aerial_e2e::driver::Driver as _;
    use aerial_e2e::pages::{LoginPage, PageObject};
    use aerial_e2e::session::Session;

    let config = DriverConfig::default().with_headless(!headed);
    let session = Session::launch(env, &config, None).await?;
    let login = LoginPage::new(session.clone());
    let state = match login.login(credentials).await {
        Ok(_) => session.driver().storage_state().await,
        Err(e) => Err(e),
    };
    session.close().await?;
    Ok(state?)
}

#[cfg(not(feature = "browser"))]
#[allow(clippy::unused_async)]
async fn ui_session(
    _env: Arc<Env>,
    _credentials: &Credentials,
    _headed: bool,
) -> CliResult<StorageState> {
    Err(CliError::invalid_argument(
        "--via ui needs aerial built with the `browser` feature",
    ))
}

fn token_storage_state(base_url: &str, token: &str) -> StorageState {
    StorageState {
        cookies: Vec::new(),
        origins: vec![OriginStorage {
            origin: origin_of(base_url).to_string(),
            local_storage: vec![StorageEntry {
                name: TOKEN_STORAGE_KEY.to_string(),
                value: token.to_string(),
            }],
        }],
    }
}

/// `scheme://host[:port]` part of a URL
fn origin_of(url: &str) -> &str {
    let host_start = url.find("://").map_or(0, |i| i + 3);
    url[host_start..]
        .find('/')
        .map_or(url, |i| &url[..host_start + i])
}

// =============================================================================
// vcm
// =============================================================================

fn run_vcm(args: &VcmArgs) -> CliResult<()> {
    let env = Env::from_env();
    let api = ApiClient::new(env.vcm_url()?)?;
    let rt = runtime()?;

    match &args.command {
        VcmCommand::Length { content_id } => {
            let body: ContentLengthResponse = rt.block_on(async {
                decode_json::<ContentLengthResponse>(vcm::content_length(&api, content_id).await?)
                    .await
            })?;
            println!("{}", body.length);
        }
    }
    Ok(())
}
