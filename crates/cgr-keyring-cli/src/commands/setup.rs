//! Environment setup commands: env, exec, check, config

use anyhow::{anyhow, bail, Context, Result};
use cgr_keyring_config::{GlobalConfig, HookTarget};
use cgr_keyring_core::{
    CredentialResolver, EnvMap, EnvironmentHook, ExportScript, HookStatus, KeyringBackend,
};
use cgr_keyring_issuer::CancellationToken;
use std::io::Write;
use std::path::Path;

/// Print `export` lines for every hook target that resolved
pub async fn env(
    resolver: &CredentialResolver,
    targets: &[HookTarget],
    cancel: &CancellationToken,
    out: &mut impl Write,
) -> Result<HookStatus> {
    let hook = EnvironmentHook::new(resolver, targets.to_vec());
    let mut script = ExportScript::new();
    let status = hook.run(&mut script, cancel).await;
    write!(out, "{}", script.render())?;
    Ok(status)
}

/// Run `cmd` with hook credentials added to its environment.
///
/// Returns the command's exit code.
pub async fn exec(
    resolver: &CredentialResolver,
    targets: &[HookTarget],
    cmd: &[String],
    cancel: &CancellationToken,
) -> Result<i32> {
    let (program, args) = cmd
        .split_first()
        .ok_or_else(|| anyhow!("No command given"))?;

    let hook = EnvironmentHook::new(resolver, targets.to_vec());
    let mut env = EnvMap::new();
    let status = hook.run(&mut env, cancel).await;
    tracing::debug!(
        "Injected {} credential(s) before running {}",
        status.injected.len(),
        program
    );

    let exit = tokio::process::Command::new(program)
        .args(args)
        .envs(env.iter())
        .status()
        .await
        .with_context(|| format!("Failed to run {}", program))?;

    // Terminated by a signal
    Ok(exit.code().unwrap_or(1))
}

/// Verify the token tool is installed and report backend details
pub async fn check(
    resolver: &CredentialResolver,
    cancel: &CancellationToken,
    out: &mut impl Write,
) -> Result<bool> {
    let info = resolver.issuer().info();
    writeln!(out, "Tool:          {}", info.tool)?;
    if let Some(audience) = &info.audience {
        writeln!(out, "Audience:      {}", audience)?;
    }
    writeln!(out, "Domain suffix: {}", resolver.matcher().suffix())?;
    writeln!(out, "Priority:      {}", resolver.priority())?;

    match resolver.ping(cancel).await {
        Ok(version) => {
            writeln!(out, "Status:        ok ({})", version)?;
            Ok(true)
        }
        Err(e) => {
            writeln!(out, "Status:        unavailable ({})", e)?;
            Ok(false)
        }
    }
}

/// Show the effective configuration, or write it out with `init`
pub fn config(
    config: &GlobalConfig,
    path: Option<&Path>,
    init: bool,
    out: &mut impl Write,
) -> Result<()> {
    if init {
        let path = path.ok_or_else(|| anyhow!("No config directory found, pass --config"))?;
        if path.exists() {
            bail!("Config file already exists: {}", path.display());
        }
        config.save_to(path)?;
        writeln!(out, "Wrote {}", path.display())?;
        return Ok(());
    }

    match path {
        Some(path) if path.exists() => writeln!(out, "# Config file: {}", path.display())?,
        Some(path) => writeln!(out, "# Config file: {} (not found, using defaults)", path.display())?,
        None => writeln!(out, "# No config directory, using defaults")?,
    }
    write!(out, "{}", config.to_toml()?)?;
    Ok(())
}
