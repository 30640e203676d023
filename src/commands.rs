use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use tracing::{debug, error, info, warn};

use crate::core::error::{WeaveError, WeaveResult};
use crate::core::paths::AppPaths;
use crate::core::process::spawn_detached;
use crate::core::setup::{SetupReport, PENGU_EXE};
use crate::core::skins::AssetIdentity;
use crate::core::state::{AppState, CURRENT_VERSION};

/// Local skin overlay pipeline for League of Legends.
#[derive(Debug, Parser)]
#[command(name = "skinweave", version, about)]
pub struct Cli {
    /// Data directory (defaults to the platform local data directory).
    #[arg(long, global = true, env = "SKINWEAVE_HOME")]
    pub home: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Apply a staged update, bootstrap the core executable and start it.
    Launch,
    /// Run as the core process until interrupted.
    Serve,
    /// Download (if needed) and apply one skin.
    Apply(ApplyArgs),
    /// Stop the overlay and remove its workspace.
    Cleanup,
    /// Print the game directory, or set it manually.
    Locate(LocateArgs),
    /// Ask the running client to restart its UI.
    RestartClient,
    /// Report whether the client is running.
    ClientStatus,
    /// Check for a newer release and stage it.
    Update(UpdateArgs),
    /// Install the overlay tools, loader and plugin.
    Setup,
}

#[derive(Debug, Args)]
pub struct ApplyArgs {
    /// Champion id.
    pub category: u32,

    /// Skin (or chroma) id.
    pub variant: u32,

    /// Parent skin id when `variant` is a chroma.
    #[arg(long = "base")]
    pub base: Option<u32>,

    #[arg(long = "champion")]
    pub champion: Option<String>,

    #[arg(long = "skin")]
    pub skin: Option<String>,

    #[arg(long = "chroma")]
    pub chroma: Option<String>,
}

impl ApplyArgs {
    fn identity(&self) -> AssetIdentity {
        AssetIdentity {
            category_id: self.category,
            variant_id: self.variant,
            base_variant_id: self.base,
            display_name: self.skin.clone(),
            parent_display_name: self.champion.clone(),
            sub_variant_display_name: self.chroma.clone(),
        }
    }
}

#[derive(Debug, Args)]
pub struct LocateArgs {
    /// Use this directory instead of searching.
    #[arg(long = "set")]
    pub set: Option<String>,
}

#[derive(Debug, Args)]
pub struct UpdateArgs {
    /// Swap a staged update into the core executable right away.
    #[arg(long = "apply")]
    pub apply: bool,
}

pub async fn dispatch(cli: Cli) -> WeaveResult<()> {
    let paths = cli.home.map(AppPaths::new).unwrap_or_else(AppPaths::from_env);
    let state = Arc::new(AppState::new(paths)?);

    match cli.command.unwrap_or(Command::Launch) {
        Command::Launch => launch(&state),
        Command::Serve => serve(state).await,
        Command::Apply(args) => apply(&state, &args).await,
        Command::Cleanup => cleanup(&state),
        Command::Locate(args) => locate(&state, &args),
        Command::RestartClient => restart_client(&state).await,
        Command::ClientStatus => {
            let running = state.liaison()?.is_running();
            println!("{}", if running { "running" } else { "not running" });
            Ok(())
        }
        Command::Update(args) => update(&state, &args).await,
        Command::Setup => {
            let report = state.setup().run().await?;
            print_json(&report)
        }
    }
}

// ── Launcher role ───────────────────────────────────────

fn launch(state: &AppState) -> WeaveResult<()> {
    let core = prepare_core_exe(state, &std::env::current_exe()?)?;

    let mut cmd = std::process::Command::new(core);
    cmd.arg("--home").arg(state.paths.root()).arg("serve");
    let pid = spawn_detached(cmd)?;
    println!("core started (pid {pid})");
    Ok(())
}

/// Swap in a staged update, then bootstrap core from `current_exe` if it
/// does not exist yet. Returns the core executable to start.
fn prepare_core_exe(state: &AppState, current_exe: &Path) -> WeaveResult<PathBuf> {
    let updater = state.updater();
    match updater.apply_pending_update() {
        Ok(true) => info!("Pending update applied"),
        Ok(false) => debug!("No pending update"),
        Err(err) => warn!("Could not apply pending update: {}", err),
    }
    updater.bootstrap_core(current_exe)?;
    Ok(updater.core_path().to_path_buf())
}

// ── Core role ───────────────────────────────────────────

async fn serve(state: Arc<AppState>) -> WeaveResult<()> {
    let startup = start_core(&state, CURRENT_VERSION).await?;
    debug!(
        "Startup done (reinstalled: {}, setup: {:?})",
        startup.reinstalled, startup.setup
    );

    let periodic = spawn_periodic_update_check(state.clone());
    info!("Skinweave core ready");
    shutdown_signal().await;
    info!("Shutting down");

    if let Some(task) = periodic {
        task.abort();
    }
    cleanup(&state)
}

#[derive(Debug)]
struct CoreStartup {
    reinstalled: bool,
    setup: SetupReport,
}

/// Startup of the core process. The version file is written only here, after
/// the reinstall check has seen the previous value.
async fn start_core(state: &AppState, current_version: &str) -> WeaveResult<CoreStartup> {
    let updater = state.updater();
    let setup = state.setup();

    let reinstalled = updater.needs_reinstall(current_version);
    if reinstalled {
        info!("Version changed, refreshing plugin");
        if let Err(err) = setup.install_plugin().await {
            warn!("Plugin refresh failed: {}", err);
        }
        updater.save_version(current_version)?;
        updater.cleanup_update_file();
    }

    run_update_check(state, current_version).await;
    let report = setup.run().await?;
    updater.save_version(current_version)?;
    Ok(CoreStartup {
        reinstalled,
        setup: report,
    })
}

async fn run_update_check(state: &AppState, current_version: &str) {
    match state.updater().check_for_update(current_version).await {
        Ok(check) if check.downloaded => info!(
            "Update {} downloaded, it applies on next launch",
            check.latest_version
        ),
        Ok(check) => debug!("Update check: latest is {}", check.latest_version),
        Err(err) => warn!("Update check failed: {}", err),
    }
    if let Err(err) = state.config.record_update_check(Utc::now()) {
        warn!("Could not record update check: {}", err);
    }
}

fn spawn_periodic_update_check(state: Arc<AppState>) -> Option<tokio::task::JoinHandle<()>> {
    let settings = state.config.snapshot();
    let interval = Duration::from_secs(settings.update_check_interval_mins.checked_mul(60)?);
    if interval.is_zero() {
        info!("Periodic update checks disabled");
        return None;
    }

    Some(tokio::spawn(async move {
        let mut delay = next_check_delay(settings.last_update_check, interval, Utc::now());
        loop {
            tokio::time::sleep(delay).await;
            run_update_check(&state, CURRENT_VERSION).await;
            delay = interval;
        }
    }))
}

/// Time left until the next check, counting from the last recorded one.
fn next_check_delay(last: Option<DateTime<Utc>>, interval: Duration, now: DateTime<Utc>) -> Duration {
    let Some(last) = last else {
        return interval;
    };
    let elapsed = (now - last).to_std().unwrap_or(Duration::ZERO);
    interval.saturating_sub(elapsed)
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
                return;
            }
            Err(err) => warn!("SIGTERM handler unavailable: {}", err),
        }
    }
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for ctrl-c: {}", err);
    }
}

// ── Actions ─────────────────────────────────────────────

async fn apply(state: &AppState, args: &ApplyArgs) -> WeaveResult<()> {
    let report = state.pipeline().apply(&args.identity()).await?;
    if !report.confirmed {
        warn!("Overlay started but could not be confirmed running");
    }
    print_json(&report)
}

fn cleanup(state: &AppState) -> WeaveResult<()> {
    state.pipeline().cleanup()?;
    if state.processes.kill(PENGU_EXE) > 0 {
        info!("Stopped Pengu Loader");
    }
    Ok(())
}

fn locate(state: &AppState, args: &LocateArgs) -> WeaveResult<()> {
    let locator = state.locator();
    let dir = match &args.set {
        Some(input) => locator.accept_manual(input)?,
        None => locator.require()?,
    };
    println!("{}", dir.display());
    Ok(())
}

async fn restart_client(state: &AppState) -> WeaveResult<()> {
    let liaison = state.liaison()?;
    if !liaison.is_running() {
        return Err(WeaveError::CredentialExtraction("client is not running".into()));
    }
    liaison.restart().await?;
    println!("client restart requested");
    Ok(())
}

async fn update(state: &AppState, args: &UpdateArgs) -> WeaveResult<()> {
    let updater = state.updater();
    let check = updater.check_for_update(CURRENT_VERSION).await?;
    state.config.record_update_check(Utc::now())?;
    print_json(&check)?;

    // The version file stays as is so the next `serve` sees the change.
    if args.apply && check.downloaded && updater.apply_pending_update()? {
        println!("update applied to {}", updater.core_path().display());
    }
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> WeaveResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
