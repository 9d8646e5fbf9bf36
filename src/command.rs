//! Invocation of external tools (nmap, arp, iptables, netsh, ...).

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::process::Output;
use std::sync::Mutex;
use tokio::process::Command;

use crate::errors::{NetGuardError, Result};

#[cfg(target_os = "windows")]
const CREATE_NO_WINDOW: u32 = 0x08000000;

static TOOL_CACHE: Lazy<Mutex<HashMap<String, bool>>> = Lazy::new(|| Mutex::new(HashMap::new()));

/// Create a Command that hides the console window on Windows.
pub fn hidden_command(program: &str) -> Command {
    #[allow(unused_mut)]
    let mut cmd = Command::new(program);
    #[cfg(target_os = "windows")]
    cmd.creation_flags(CREATE_NO_WINDOW);
    cmd.kill_on_drop(true);
    cmd
}

/// Runs `program` with `args`, optionally through `sudo -n`, and returns its raw output.
pub async fn run(program: &str, args: &[&str], sudo: bool) -> Result<Output> {
    let mut cmd = if sudo {
        let mut cmd = hidden_command("sudo");
        cmd.arg("-n").arg(program);
        cmd
    } else {
        hidden_command(program)
    };
    cmd.args(args);

    tracing::debug!("exec: {}{} {}", if sudo { "sudo " } else { "" }, program, args.join(" "));
    Ok(cmd.output().await?)
}

/// Like [`run`], but a non-zero exit status becomes an error carrying stderr.
pub async fn run_checked(program: &str, args: &[&str], sudo: bool) -> Result<String> {
    let output = run(program, args, sudo).await?;
    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(NetGuardError::Enforcement(format!(
            "{} exited with {}: {}",
            program,
            output.status,
            stderr.trim()
        )))
    }
}

/// Whether `name` resolves on PATH. Answers are cached for the process lifetime.
pub async fn tool_available(name: &str) -> bool {
    if let Some(&known) = tool_cache().get(name) {
        return known;
    }

    let locator = if cfg!(windows) { "where" } else { "which" };
    let found = hidden_command(locator)
        .arg(name)
        .output()
        .await
        .map(|out| out.status.success())
        .unwrap_or(false);

    tool_cache().insert(name.to_string(), found);
    found
}

fn tool_cache() -> std::sync::MutexGuard<'static, HashMap<String, bool>> {
    TOOL_CACHE.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
