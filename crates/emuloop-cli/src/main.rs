//! # emuloop-cli
//!
//! Binary entry point for the emuloop orchestrator.
//!
//! This crate provides:
//! - CLI argument parsing using `clap`
//! - Application initialization and configuration
//! - Entry point to the development loop (`emuloop run`)
//! - One-shot diagnostics via `emuloop diagnose`

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use emuloop_core::{
    BuildSupervisor, DiagnosticRecorder, EmuloopConfig, InterruptFlag, IterationDriver, RecordKind,
    SessionContext, SessionOrchestrator, analyze,
};
use emuloop_proto::{Analysis, Session, SessionStatus};
use std::path::PathBuf;
use tracing::{info, warn};

// Unix-specific process management for process group leadership
#[cfg(unix)]
mod process_management {
    use nix::unistd::{Pid, setpgid};
    use tracing::debug;

    /// Sets up process group leadership.
    ///
    /// The orchestrator leads its own process group so the build tool, the
    /// emulator, and the capture utility all belong to it, and a signal to
    /// the group cannot leave orphans behind.
    pub fn setup_process_group() {
        let pid = Pid::this();
        if let Err(e) = setpgid(pid, pid) {
            // EPERM means we already lead a group (e.g. started from a shell)
            if e != nix::errno::Errno::EPERM {
                debug!("Note: Could not set process group ({}), continuing anyway", e);
            }
        }
        debug!("Process group initialized: PID {}", pid);
    }
}

#[cfg(not(unix))]
mod process_management {
    /// No-op on non-Unix platforms.
    pub fn setup_process_group() {}
}

/// emuloop - build/run/observe/analyze feedback loop for emulator targets
#[derive(Parser, Debug)]
#[command(name = "emuloop", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to configuration file
    #[arg(short, long, default_value = "emuloop.yml", global = true)]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the development loop (default if no subcommand given)
    Run(RunArgs),

    /// Run one build + observation session and print the analysis
    Diagnose(DiagnoseArgs),
}

/// Arguments for the run subcommand.
#[derive(Parser, Debug, Default)]
struct RunArgs {
    /// Override max iterations
    #[arg(long)]
    iterations: Option<u32>,

    /// Override the build target
    #[arg(long)]
    target: Option<String>,
}

/// Arguments for the diagnose subcommand.
#[derive(Parser, Debug)]
struct DiagnoseArgs {
    /// Override the observation duration in seconds
    #[arg(long)]
    duration: Option<u64>,

    /// Override the build target
    #[arg(long)]
    target: Option<String>,

    /// Skip the build and observe the existing program artifact
    #[arg(long)]
    skip_build: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Some(Commands::Run(args)) => run_command(cli.config, args).await,
        Some(Commands::Diagnose(args)) => diagnose_command(cli.config, args).await,
        // Default to run with no overrides
        None => run_command(cli.config, RunArgs::default()).await,
    }
}

fn load_config(config_path: &PathBuf) -> Result<EmuloopConfig> {
    if config_path.exists() {
        EmuloopConfig::from_file(config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))
    } else {
        warn!("Config file {:?} not found, using defaults", config_path);
        Ok(EmuloopConfig::default())
    }
}

/// Installs signal handling: the first SIGINT (or SIGTERM) trips the
/// interrupt flag and lets the current iteration clean up; a second SIGINT
/// exits immediately.
fn install_signal_handlers(interrupt: &InterruptFlag) {
    let sigint_flag = interrupt.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received (SIGINT), stopping after cleanup...");
            sigint_flag.trigger();
        }
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Second interrupt, exiting immediately");
            std::process::exit(130);
        }
    });

    #[cfg(unix)]
    {
        let sigterm_flag = interrupt.clone();
        tokio::spawn(async move {
            let Ok(mut sigterm) =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            else {
                warn!("Failed to register SIGTERM handler");
                return;
            };
            sigterm.recv().await;
            warn!("SIGTERM received, stopping after cleanup...");
            sigterm_flag.trigger();
        });
    }
}

fn apply_run_overrides(config: &mut EmuloopConfig, args: &RunArgs) {
    if let Some(iterations) = args.iterations {
        config.iteration.max_iterations = iterations;
    }
    if let Some(target) = &args.target {
        config.build.target = target.clone();
    }
}

fn apply_diagnose_overrides(config: &mut EmuloopConfig, args: &DiagnoseArgs) {
    if let Some(duration) = args.duration {
        config.capture.duration_secs = duration;
    }
    if let Some(target) = &args.target {
        config.build.target = target.clone();
    }
}

async fn run_command(config_path: PathBuf, args: RunArgs) -> Result<()> {
    let mut config = load_config(&config_path)?;
    apply_run_overrides(&mut config, &args);
    config.validate().context("Configuration validation failed")?;

    process_management::setup_process_group();
    let interrupt = InterruptFlag::new();
    install_signal_handlers(&interrupt);

    let max_iterations = config.iteration.max_iterations;
    let driver = IterationDriver::new(config, interrupt);
    let outcome = driver.run_loop(max_iterations).await;

    let exit_code = outcome.termination.exit_code();
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}

async fn diagnose_command(config_path: PathBuf, args: DiagnoseArgs) -> Result<()> {
    let mut config = load_config(&config_path)?;
    apply_diagnose_overrides(&mut config, &args);
    config.validate().context("Configuration validation failed")?;

    process_management::setup_process_group();
    let interrupt = InterruptFlag::new();
    install_signal_handlers(&interrupt);

    let ctx = SessionContext::create(&config).context("Failed to create session context")?;
    let recorder = DiagnosticRecorder::new(&ctx.logs_dir);
    let target = config.build.target.clone();

    if args.skip_build {
        info!("Skipping build, observing existing program artifact");
    } else {
        let supervisor = BuildSupervisor::new(config.build.clone(), ctx.project_dir.clone());
        let build = supervisor.build(&ctx, &recorder, &target).await?;
        if !build.success {
            eprintln!("Build failed:");
            for line in build.stderr.lines().take(20) {
                eprintln!("  {line}");
            }
            anyhow::bail!("build failed; see {:?}", recorder.artifact_path(RecordKind::Build, &ctx.session_id));
        }
    }

    let program = config.program_name(&target);
    let orchestrator = SessionOrchestrator::new(&config, &recorder, interrupt);
    let session = orchestrator
        .run_session(&ctx, &program, config.capture.duration_secs)
        .await?;

    let analysis = analyze(&session);
    recorder.record(RecordKind::Analysis, &ctx.session_id, &analysis)?;

    print_diagnostic_report(&session, &analysis, &recorder);

    if session.status != SessionStatus::Completed {
        std::process::exit(1);
    }
    Ok(())
}

fn print_diagnostic_report(session: &Session, analysis: &Analysis, recorder: &DiagnosticRecorder) {
    println!("Session {}: {}", session.session_id, session.status.as_str());
    if let Some(error) = &session.error {
        println!("  Error: {error}");
    }
    println!("  Program: {} ({}s planned)", session.program, session.duration_secs);
    if let Some(pid) = session.emulator_pid {
        println!("  Emulator PID: {pid}");
    }
    println!("  Captures: {}", session.captures.len());
    for capture in &session.captures {
        println!(
            "    t+{}s  {} ({} bytes)",
            capture.time_secs,
            capture.file.display(),
            capture.size_bytes
        );
    }
    if let Some(recording) = &session.recording {
        println!("  Recording: {}", recording.display());
    }
    if analysis.issues.is_empty() {
        println!("  Analysis: no issues detected");
    } else {
        println!("  Issues:");
        for issue in &analysis.issues {
            println!("    - {issue}");
        }
        println!("  Recommendations:");
        for recommendation in &analysis.recommendations {
            println!("    - {recommendation}");
        }
    }
    println!(
        "  Artifacts: {}",
        recorder
            .artifact_path(RecordKind::Session, &session.session_id)
            .display()
    );
}
