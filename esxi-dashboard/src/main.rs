//! ESXi Dashboard CLI
//!
//! `esxi-dash` drives the ESXi patch orchestrator from a terminal:
//! - One-shot views of hosts, jobs and patches
//! - A live `watch` screen refreshed on a fixed cadence
//! - Admin commands (hosts, pre-checks, two-phase patching, depots, settings)

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use esxi_dashboard::config::DashboardConfig;
use esxi_dashboard::models::{JobWindow, SETTING_AUTO_PHASE2_WINDOW, SETTING_REBOOT_GRACE_PERIOD};
use esxi_dashboard::prompt::{
    prompt_password, prompt_with_default, prompt_yes_no, Confirm, FixedAnswer, TerminalConfirm,
};
use esxi_dashboard::render;
use esxi_dashboard::validation::{parse_address_list, validate_addresses};
use esxi_dashboard::wizard::SetupWizard;
use esxi_dashboard::{
    AutoRefresh, Dashboard, DashboardView, Dispatch, HttpOrchestrator, PatchChoice, Session,
    UploadEvent, UploadProgress,
};

type Console = Dashboard<HttpOrchestrator>;

#[derive(Parser)]
#[command(
    name = "esxi-dash",
    version,
    about = "Operator console for the ESXi patch orchestrator"
)]
struct Cli {
    /// Config file (default: OS config dir or $ESXI_DASHBOARD_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Answer yes to every confirmation
    #[arg(long, short = 'y', global = true)]
    yes: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct Targets {
    /// Host IP addresses
    hosts: Vec<String>,
    /// Every host in the current list
    #[arg(long, conflicts_with = "hosts")]
    all: bool,
}

impl Targets {
    fn resolve(&self, dashboard: &Console) -> BTreeSet<String> {
        if self.all {
            dashboard.select_all();
            dashboard.selection()
        } else {
            self.hosts.iter().cloned().collect()
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Run the interactive setup wizard
    Setup,
    /// Verify admin credentials and optionally remember them
    Login,
    /// Forget remembered credentials
    Logout,
    /// Show the dashboard once
    Status,
    /// Live dashboard, refreshed until Ctrl-C
    Watch,
    /// List hosts
    Hosts,
    /// List jobs
    Jobs {
        /// Only jobs from the last N hours (rounded to whole days)
        #[arg(long)]
        hours: Option<u32>,
    },
    /// Register hosts
    Add {
        /// Host IP addresses
        ips: Vec<String>,
        /// Read addresses from a file, one per line
        #[arg(long)]
        from_file: Option<PathBuf>,
        /// Do not start pre-checks on the new hosts
        #[arg(long)]
        no_precheck: bool,
    },
    /// Unregister a host
    Remove { ip: String },
    /// Re-probe one host
    Refresh { ip: String },
    /// Re-probe every host, one after the other
    RefreshAll,
    /// Run pre-checks
    Precheck(Targets),
    /// Stage a patch on hosts (phase 1)
    Phase1 {
        /// Depot already uploaded to the orchestrator
        #[arg(long, conflicts_with = "upload")]
        patch: Option<String>,
        /// Local depot to upload first
        #[arg(long)]
        upload: Option<PathBuf>,
        #[command(flatten)]
        targets: Targets,
    },
    /// Reboot hosts into the staged build (phase 2)
    Phase2(Targets),
    /// List uploaded patches
    Patches,
    /// Upload a depot (.zip)
    Upload { file: PathBuf },
    /// Delete an uploaded patch
    DeletePatch { filename: String },
    /// Save orchestrator settings
    Settings {
        /// Minutes to wait before an automatic phase 2
        #[arg(long)]
        auto_phase2_window: Option<u32>,
        /// Minutes to wait for a host to come back after reboot
        #[arg(long)]
        reboot_grace_period: Option<u32>,
        /// Extra setting as key=value (repeatable)
        #[arg(long = "set", value_parser = parse_key_value)]
        extra: Vec<(String, String)>,
    },
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected key=value, got '{}'", raw)),
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("esxi_dashboard=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("{}", render::failure(&format!("{:#}", e)));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let path = cli.config.as_deref();

    if DashboardConfig::is_first_time_setup(path)
        && !cli.yes
        && !matches!(cli.command, Command::Setup)
        && prompt_yes_no("No configuration found. Run the setup wizard now?", true)?
    {
        SetupWizard::run(&DashboardConfig::default(), path).await?;
    }

    let mut config = DashboardConfig::load(path).await?;
    let api = HttpOrchestrator::with_timeout(&config.api.base_url, config.request_timeout())?;
    let confirm: Box<dyn Confirm> = if cli.yes {
        Box::new(FixedAnswer(true))
    } else {
        Box::new(TerminalConfirm)
    };
    let dashboard = Arc::new(Dashboard::new(api, confirm).with_job_window(config.job_window()));
    info!("orchestrator at {}", dashboard.api().base_url());

    match cli.command {
        Command::Setup => SetupWizard::run(&config, path).await?,

        Command::Login => {
            let (username, password) = ask_credentials(&config)?;
            let session = dashboard.authenticate(&username, &password).await?;
            println!(
                "{}",
                render::success(&format!("Logged in as {}", session.username()))
            );

            if prompt_yes_no(
                "Remember these credentials (OS keyring)?",
                config.credentials.remember,
            )? {
                config.credentials.remember = true;
                config.credentials.username = Some(username);
                config.credentials.cached_password = Some(password);
                config
                    .save(path)
                    .await
                    .context("Failed to save credentials")?;
            }
        }

        Command::Logout => {
            config.forget_password();
            config.credentials.remember = false;
            config.save(path).await?;
            println!("{}", render::success("Logged out"));
        }

        Command::Status => {
            viewer_session(&dashboard, &mut config).await?;
            println!("{}", render::dashboard(&dashboard.view()));
        }

        Command::Watch => {
            let session = viewer_session(&dashboard, &mut config).await?;
            let poller = AutoRefresh::start(
                dashboard.clone(),
                session,
                config.refresh_interval(),
                Some(Box::new(|view: &DashboardView| {
                    print!("\x1b[2J\x1b[H{}", render::dashboard(view));
                    let _ = std::io::stdout().flush();
                })),
            );
            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl-C")?;
            poller.stop().await;
        }

        Command::Hosts => {
            viewer_session(&dashboard, &mut config).await?;
            let view = dashboard.view();
            println!("{}", render::statistics(&view.statistics));
            print!("{}", render::hosts(&view.hosts));
        }

        Command::Jobs { hours } => {
            let session = viewer_session(&dashboard, &mut config).await?;
            if hours.is_some() {
                dashboard
                    .filter_jobs(session.as_ref(), JobWindow::from_hours(hours))
                    .await?;
            }
            print!("{}", render::jobs(&dashboard.view().jobs));
        }

        Command::Add {
            mut ips,
            from_file,
            no_precheck,
        } => {
            if let Some(file) = from_file {
                let content = tokio::fs::read_to_string(&file)
                    .await
                    .with_context(|| format!("Failed to read {}", file.display()))?;
                ips.extend(parse_address_list(&content));
            }
            validate_addresses(&ips)?;

            let session = admin_session(&dashboard, &mut config).await?;
            let report = dashboard.add_hosts(&session, &ips, !no_precheck).await?;
            println!("{}", render::add_hosts_report(&report));
        }

        Command::Remove { ip } => {
            let session = admin_session(&dashboard, &mut config).await?;
            let dispatch = dashboard.remove_host(&session, &ip).await?;
            report(dispatch, render::MSG_HOST_REMOVED);
        }

        Command::Refresh { ip } => {
            let session = viewer_session(&dashboard, &mut config).await?;
            dashboard.refresh_host(session.as_ref(), &ip).await?;
            println!("{}", render::success(render::MSG_HOST_REFRESHED));
        }

        Command::RefreshAll => {
            let session = viewer_session(&dashboard, &mut config).await?;
            match dashboard.refresh_every_host(session.as_ref()).await? {
                Some(count) => println!(
                    "{}",
                    render::success(&format!("Refreshed {} hosts", count))
                ),
                None => println!("{}", render::MSG_CANCELLED),
            }
        }

        Command::Precheck(targets) => {
            let session = admin_session(&dashboard, &mut config).await?;
            let selected = targets.resolve(&dashboard);
            let dispatch = dashboard.run_prechecks(&session, &selected).await?;
            report(dispatch, render::MSG_PRECHECKS_STARTED);
        }

        Command::Phase1 {
            patch,
            upload,
            targets,
        } => {
            let session = admin_session(&dashboard, &mut config).await?;
            let selected = targets.resolve(&dashboard);

            let choice = match upload {
                Some(file) => {
                    // fail on the selection before spending time on the upload
                    dashboard.snapshot().resolve_targets(&selected)?;
                    upload_with_progress(&dashboard, &session, &file).await?;
                    PatchChoice::upload(file)
                }
                None => PatchChoice {
                    upload: None,
                    catalog: patch,
                },
            };

            let dispatch = dashboard.run_phase1(&session, &selected, &choice).await?;
            report(dispatch, render::MSG_PHASE1_STARTED);
        }

        Command::Phase2(targets) => {
            let session = admin_session(&dashboard, &mut config).await?;
            let selected = targets.resolve(&dashboard);
            let dispatch = dashboard.run_phase2(&session, &selected).await?;
            report(dispatch, render::MSG_PHASE2_STARTED);
        }

        Command::Patches => {
            let session = viewer_session(&dashboard, &mut config).await?;
            dashboard.load_patches(session.as_ref()).await?;
            print!("{}", render::patches(&dashboard.view().patches));
        }

        Command::Upload { file } => {
            let session = admin_session(&dashboard, &mut config).await?;
            upload_with_progress(&dashboard, &session, &file).await?;
        }

        Command::DeletePatch { filename } => {
            let session = admin_session(&dashboard, &mut config).await?;
            let dispatch = dashboard.delete_patch(&session, &filename).await?;
            report(dispatch, render::MSG_PATCH_DELETED);
        }

        Command::Settings {
            auto_phase2_window,
            reboot_grace_period,
            extra,
        } => {
            let mut settings = config.settings.clone();
            if let Some(minutes) = auto_phase2_window {
                settings.insert(SETTING_AUTO_PHASE2_WINDOW.to_string(), minutes.to_string());
            }
            if let Some(minutes) = reboot_grace_period {
                settings.insert(SETTING_REBOOT_GRACE_PERIOD.to_string(), minutes.to_string());
            }
            settings.extend(extra);

            let session = admin_session(&dashboard, &mut config).await?;
            dashboard.save_settings(&session, &settings).await?;
            println!("{}", render::success(render::MSG_SETTINGS_SAVED));
        }
    }

    Ok(())
}

fn report(dispatch: Dispatch, message: &str) {
    match dispatch {
        Dispatch::Sent => println!("{}", render::success(message)),
        Dispatch::Declined => println!("{}", render::MSG_CANCELLED),
    }
}

fn ask_credentials(config: &DashboardConfig) -> Result<(String, String)> {
    let username = prompt_with_default(
        "Username",
        config.credentials.username.as_deref().unwrap_or("admin"),
    )?;
    let password = prompt_password("Password")?.unwrap_or_default();
    Ok((username, password))
}

/// Re-verifies remembered credentials. A rejected password is removed from
/// the keyring.
async fn remembered_session(dashboard: &Console, config: &mut DashboardConfig) -> Option<Session> {
    let (username, password) = config.remembered_login()?;
    let (username, password) = (username.to_string(), password.to_string());

    match dashboard.authenticate(&username, &password).await {
        Ok(session) => Some(session),
        Err(e) => {
            warn!("remembered credentials for {} no longer work: {}", username, e);
            config.forget_password();
            None
        }
    }
}

/// Remembered admin session if there is one, otherwise an anonymous refresh
async fn viewer_session(dashboard: &Console, config: &mut DashboardConfig) -> Result<Option<Session>> {
    if let Some(session) = remembered_session(dashboard, config).await {
        return Ok(Some(session));
    }
    dashboard.refresh_all(None).await?;
    Ok(None)
}

async fn admin_session(dashboard: &Console, config: &mut DashboardConfig) -> Result<Session> {
    if let Some(session) = remembered_session(dashboard, config).await {
        return Ok(session);
    }
    let (username, password) = ask_credentials(config)?;
    Ok(dashboard.authenticate(&username, &password).await?)
}

async fn upload_with_progress(dashboard: &Console, session: &Session, file: &Path) -> Result<()> {
    let (progress, mut events) = UploadProgress::channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            // failures are reported once, by the caller
            if !matches!(event, UploadEvent::Failed { .. }) {
                println!("{}", render::upload_event(&event));
            }
        }
    });

    let result = dashboard.upload_patch(session, file, progress).await;
    if let Err(e) = printer.await {
        warn!("upload progress printer failed: {}", e);
    }
    Ok(result?)
}
