//! fxa-sample binary entry point.
//!
//! Usage: fxa-sample [--base-dir <dir>] [--log-level <level>] <command>
//!
//! The redirect that finishes a sign-in is received either by a loopback
//! callback server (`--listen`, needs an `http://localhost:<port>/...`
//! redirect URI) or pasted on stdin.

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand, ValueEnum};
use fxa_config_and_utils::{init_logging, Config, LogFormat, Paths};
use fxa_flow::{
    AuthFlowEngine, FlowRequest, FlowSettings, HttpIdentityClient, PersistenceGateway, Profile,
    RedirectCallbackServer, SessionCoordinator, SessionEvent, UrlSurface,
    DEFAULT_CALLBACK_TIMEOUT_SECS,
};
use fxa_storage::{create_storage, SecureStorage};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Sample client for Firefox Accounts sign-in and device pairing.
#[derive(Parser, Debug)]
#[command(name = "fxa-sample")]
#[command(about = "Sign in to Firefox Accounts with OAuth or device pairing")]
struct Args {
    /// Directory holding config.json and state.json.
    #[arg(long, env = "FXA_SAMPLE_HOME")]
    base_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error). Overrides the config file.
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start an OAuth flow in the browser.
    Login {
        /// Also request Sync keys.
        #[arg(long)]
        keys: bool,

        /// Where the authorization page should be opened.
        #[arg(long, value_enum, default_value_t = Surface::Tab)]
        surface: Surface,

        /// Receive the redirect on the loopback callback server.
        #[arg(long)]
        listen: bool,
    },
    /// Pair with a signed-in device using the URL from its QR code.
    Pair {
        /// Pairing URL shown by the authority device.
        url: String,

        /// Also request Sync keys.
        #[arg(long)]
        keys: bool,

        /// Receive the redirect on the loopback callback server.
        #[arg(long)]
        listen: bool,
    },
    /// Show the signed-in account.
    Status,
    /// Forget the signed-in account.
    Logout,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Surface {
    Tab,
    Webview,
}

impl From<Surface> for UrlSurface {
    fn from(surface: Surface) -> Self {
        match surface {
            Surface::Tab => UrlSurface::CustomTab,
            Surface::Webview => UrlSurface::WebView,
        }
    }
}

fn flow_request(keys: bool) -> FlowRequest {
    if keys {
        FlowRequest::with_sync_keys()
    } else {
        FlowRequest::profile()
    }
}

/// Print session events until the coordinator is dropped.
fn spawn_ui(mut events: mpsc::UnboundedReceiver<SessionEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                SessionEvent::OpenUrl { url, surface } => {
                    println!("Open this URL in a {}:\n\n  {}\n", surface, url);
                }
                SessionEvent::ProfileUpdated(profile) => print_profile(&profile),
                SessionEvent::Failed(message) => eprintln!("error: {}", message),
                SessionEvent::LoggedOut => println!("Logged out."),
            }
        }
    })
}

fn print_profile(profile: &Profile) {
    println!("Signed in as {}", profile.display_line());
}

async fn read_redirect_url() -> anyhow::Result<String> {
    eprintln!("Paste the redirect URL and press Enter:");
    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("Failed to read the redirect URL")?;
    Ok(line.trim().to_string())
}

fn callback_server(config: &Config, listen: bool) -> anyhow::Result<Option<RedirectCallbackServer>> {
    if !listen {
        return Ok(None);
    }
    RedirectCallbackServer::for_redirect_uri(
        &config.redirect_uri,
        Duration::from_secs(DEFAULT_CALLBACK_TIMEOUT_SECS),
    )
    .map(Some)
    .ok_or_else(|| {
        anyhow!(
            "--listen needs a loopback redirect URI like http://localhost:9876/callback, configured is {}",
            config.redirect_uri
        )
    })
}

/// Wait for the redirect and complete the flow. Failures reach the user
/// through the event printer.
async fn finish_flow(
    coordinator: &SessionCoordinator,
    server: Option<(RedirectCallbackServer, tokio::net::TcpListener)>,
) -> bool {
    let completion = async {
        let completed = match server {
            Some((server, listener)) => match server.serve(listener).await {
                Ok(params) => coordinator.on_redirect(&params.code, &params.state).await,
                Err(e) => {
                    eprintln!("error: {}", e);
                    return false;
                }
            },
            None => match read_redirect_url().await {
                Ok(redirect_url) => coordinator.on_redirect_url(&redirect_url).await,
                Err(e) => {
                    eprintln!("error: {:#}", e);
                    return false;
                }
            },
        };
        if let Err(e) = &completed {
            debug!(error = %e, "Flow did not complete");
        }
        completed.is_ok()
    };

    tokio::select! {
        ok = completion => ok,
        _ = tokio::signal::ctrl_c() => {
            info!("Received interrupt, abandoning the flow");
            false
        }
    }
}

async fn bind(
    server: Option<RedirectCallbackServer>,
) -> anyhow::Result<Option<(RedirectCallbackServer, tokio::net::TcpListener)>> {
    match server {
        Some(server) => {
            let listener = server
                .bind()
                .await
                .context("Failed to start the callback server")?;
            Ok(Some((server, listener)))
        }
        None => Ok(None),
    }
}

async fn login(
    engine: AuthFlowEngine,
    config: &Config,
    request: FlowRequest,
    surface: UrlSurface,
    listen: bool,
) -> anyhow::Result<bool> {
    let server = callback_server(config, listen)?;
    let (coordinator, events) = SessionCoordinator::new(engine, None, request.clone());
    let ui = spawn_ui(events);

    let ok = match coordinator.account().await {
        Ok(account) => {
            if account.is_authenticated().await {
                println!("Already signed in. Run `fxa-sample logout` first to switch accounts.");
                true
            } else {
                let server = bind(server).await?;
                match coordinator.begin_oauth(&request, surface).await {
                    Ok(_) => finish_flow(&coordinator, server).await,
                    Err(_) => false,
                }
            }
        }
        Err(e) => {
            eprintln!("error: {}", e);
            false
        }
    };

    shutdown(coordinator, ui).await;
    Ok(ok)
}

async fn pair(
    engine: AuthFlowEngine,
    config: &Config,
    pairing_url: String,
    request: FlowRequest,
    listen: bool,
) -> anyhow::Result<bool> {
    let server = bind(callback_server(config, listen)?).await?;
    let (coordinator, events) = SessionCoordinator::new(engine, Some(pairing_url), request);
    let ui = spawn_ui(events);

    let ok = match coordinator.account().await {
        Ok(account) => {
            if account.is_authenticated().await {
                println!("Already signed in. Run `fxa-sample logout` first to pair.");
                true
            } else {
                finish_flow(&coordinator, server).await
            }
        }
        Err(e) => {
            eprintln!("error: {}", e);
            false
        }
    };

    shutdown(coordinator, ui).await;
    Ok(ok)
}

async fn status(engine: AuthFlowEngine) -> anyhow::Result<bool> {
    if engine.persistence().load().ok().flatten().is_none() {
        println!("Not signed in.");
        return Ok(true);
    }

    let (coordinator, events) = SessionCoordinator::new(engine, None, FlowRequest::profile());
    let ui = spawn_ui(events);
    let ok = match coordinator.account().await {
        Ok(account) => {
            let state = account.flow_state().await;
            info!(%state, "Account loaded");
            true
        }
        Err(e) => {
            eprintln!("error: {}", e);
            false
        }
    };

    shutdown(coordinator, ui).await;
    Ok(ok)
}

async fn logout(engine: AuthFlowEngine) -> anyhow::Result<bool> {
    let (coordinator, events) = SessionCoordinator::new(engine, None, FlowRequest::profile());
    let ui = spawn_ui(events);
    let ok = coordinator.logout().await.is_ok();
    shutdown(coordinator, ui).await;
    Ok(ok)
}

/// Release the account, then let the printer drain the remaining events.
async fn shutdown(coordinator: SessionCoordinator, ui: JoinHandle<()>) {
    if let Some(release) = coordinator.shutdown() {
        let _ = release.await;
    }
    drop(coordinator);
    let _ = ui.await;
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    let paths = match args.base_dir {
        Some(dir) => Paths::with_base_dir(dir),
        None => Paths::new()?,
    };
    paths.ensure_dirs()?;

    let mut config = Config::load(&paths)?;
    if let Some(level) = args.log_level {
        config.log_level = level;
    }
    init_logging(&config.log_level, LogFormat::from_env());

    info!(
        content_url = %config.content_url,
        pairing_url = %config.pairing_content_url,
        client_id = %config.client_id,
        state_file = %paths.state_file().display(),
        "Configuration loaded"
    );

    let client = Arc::new(HttpIdentityClient::new(config.http_timeout())?);
    let storage: Arc<dyn SecureStorage> = Arc::from(create_storage(paths.state_file()));
    let engine = AuthFlowEngine::new(
        FlowSettings::from_config(&config),
        client,
        PersistenceGateway::new(storage),
    );

    let ok = match args.command {
        Command::Login {
            keys,
            surface,
            listen,
        } => login(engine, &config, flow_request(keys), surface.into(), listen).await?,
        Command::Pair { url, keys, listen } => {
            pair(engine, &config, url, flow_request(keys), listen).await?
        }
        Command::Status => status(engine).await?,
        Command::Logout => logout(engine).await?,
    };

    Ok(if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
