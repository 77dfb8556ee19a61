use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use daemonize::Daemonize;

use tube_relay::config::{self, Config, TelegramMode};

/// Fork into the background, then start the runtime in the child.
/// Must run before any Tokio runtime exists.
#[cfg(unix)]
pub fn daemonize_and_run(config_path: Option<&Path>, verbose: bool) -> Result<()> {
    let config = Config::load(config_path)?;
    let pid_file = prepare_pid_file()?;
    let log_file = get_log_file()?;

    println!(
        "Starting tube-relay in background (channel: {})...",
        config.telegram.channel.as_deref().unwrap_or("-")
    );
    println!("  PID file: {}", pid_file.display());
    println!("  Log file: {}", log_file.display());
    if config.server.enabled {
        println!("  Server: http://{}", config.server_addr());
    }
    println!("\nUse 'tube-relay status' to check status");
    println!("Use 'tube-relay stop' to stop\n");

    let stdout = fs::File::create(&log_file)?;
    let stderr = stdout.try_clone()?;

    Daemonize::new()
        .pid_file(&pid_file)
        .working_directory(std::env::current_dir()?)
        .stdout(stdout)
        .stderr(stderr)
        .start()
        .map_err(|e| anyhow::anyhow!("Failed to daemonize: {}", e))?;

    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async {
            crate::init_logging(&config.logging, verbose);
            tube_relay::service::run(config).await
        });

    fs::remove_file(&pid_file).ok();
    result
}

pub async fn run_foreground(config: Config) -> Result<()> {
    let pid_file = prepare_pid_file()?;

    println!(
        "Starting tube-relay in foreground (channel: {})...",
        config.telegram.channel.as_deref().unwrap_or("-")
    );
    fs::write(&pid_file, std::process::id().to_string())?;

    let result = tube_relay::service::run(config).await;

    fs::remove_file(&pid_file).ok();
    result
}

pub async fn stop() -> Result<()> {
    let pid_file = get_pid_file()?;

    if !pid_file.exists() {
        println!("tube-relay is not running");
        return Ok(());
    }

    let pid = fs::read_to_string(&pid_file)?.trim().to_string();

    if !is_process_running(&pid) {
        println!("tube-relay is not running (stale PID file)");
        fs::remove_file(&pid_file)?;
        return Ok(());
    }

    #[cfg(unix)]
    {
        use std::process::Command;
        Command::new("kill").args(["-TERM", &pid]).status()?;
    }

    #[cfg(windows)]
    {
        use std::process::Command;
        Command::new("taskkill").args(["/PID", &pid]).status()?;
    }

    println!("Sent stop signal to tube-relay (PID: {})", pid);
    fs::remove_file(&pid_file)?;

    Ok(())
}

pub async fn status(config_path: Option<&Path>) -> Result<()> {
    let config = Config::load_unvalidated(config_path)?;
    let pid_file = get_pid_file()?;

    let pid = if pid_file.exists() {
        Some(fs::read_to_string(&pid_file)?.trim().to_string())
    } else {
        None
    };
    let running = pid.as_deref().map(is_process_running).unwrap_or(false);

    println!("tube-relay status");
    println!("-----------------");
    println!("Running: {}", if running { "yes" } else { "no" });
    if let (true, Some(pid)) = (running, &pid) {
        println!("PID: {}", pid);
    }

    println!("\nConfiguration:");
    println!(
        "  Channel: {}",
        config.telegram.channel.as_deref().unwrap_or("(not set)")
    );
    println!(
        "  Mode: {}",
        match config.telegram.mode {
            TelegramMode::Polling => "polling",
            TelegramMode::Webhook => "webhook",
        }
    );
    println!("  Work dir: {}", config.work_dir().display());
    println!("  Concurrent uploads: {}", config.pipeline.max_concurrent_jobs);
    println!("  Server enabled: {}", config.server.enabled);
    if config.server.enabled {
        println!("  Server address: {}", config.server_addr());
    }
    if let Err(e) = config.validate() {
        println!("\nWarning: {}", e);
    }

    Ok(())
}

/// Refuses to start over a live instance; clears a stale PID file.
fn prepare_pid_file() -> Result<PathBuf> {
    let pid_file = get_pid_file()?;
    if pid_file.exists() {
        let pid = fs::read_to_string(&pid_file)?;
        if is_process_running(&pid) {
            anyhow::bail!("tube-relay already running (PID: {})", pid.trim());
        }
        fs::remove_file(&pid_file)?;
    }
    Ok(pid_file)
}

fn get_pid_file() -> Result<PathBuf> {
    let state_dir = config::state_dir()?;
    fs::create_dir_all(&state_dir)?;
    Ok(state_dir.join("tube-relay.pid"))
}

fn get_log_file() -> Result<PathBuf> {
    let logs_dir = config::state_dir()?.join("logs");
    fs::create_dir_all(&logs_dir)?;
    Ok(logs_dir.join("tube-relay.log"))
}

fn is_process_running(pid: &str) -> bool {
    let pid = pid.trim();

    #[cfg(unix)]
    {
        use std::process::Command;
        Command::new("kill")
            .args(["-0", pid])
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    #[cfg(windows)]
    {
        use std::process::Command;
        Command::new("tasklist")
            .args(["/FI", &format!("PID eq {}", pid)])
            .output()
            .map(|o| String::from_utf8_lossy(&o.stdout).contains(pid))
            .unwrap_or(false)
    }
}
