//! Translation of spawn options into an OS command

use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use crate::info::ProcessInfo;
use crate::io::error::SpawnError;
use crate::io::options::{ShellMode, SpawnOptions, StdioOptions};

/// Shell used when `ShellMode::Default` is requested
pub fn default_shell() -> &'static str {
    if cfg!(windows) { "powershell" } else { "/bin/sh" }
}

/// Build the command for a spawn request
///
/// Stdin is always piped; stdout and stderr follow the capture modes.
pub(crate) fn build_command(
    program: &str,
    params: &[String],
    options: &SpawnOptions,
    stdio: StdioOptions,
    info: &ProcessInfo,
) -> Result<Command, SpawnError> {
    let (executable, args) = match &options.shell {
        ShellMode::Direct => (program.to_string(), params.to_vec()),
        ShellMode::Default => shell_invocation(default_shell(), program, params),
        ShellMode::Named(shell) => shell_invocation(shell, program, params),
    };

    let mut command = Command::new(executable);
    command.args(args);

    if let Some(cwd) = &options.cwd {
        command.current_dir(resolve_cwd(cwd, info)?);
    }

    if options.clear_env {
        command.env_clear();
    }

    if let Some(env) = &options.env {
        for (key, value) in env {
            validate_env_key(key)?;
            command.env(key, value);
        }
    }

    command
        .stdin(Stdio::piped())
        .stdout(stdio.stdout.as_stdio())
        .stderr(stdio.stderr.as_stdio());

    Ok(command)
}

/// Wrap program and params into a single shell command line
fn shell_invocation(shell: &str, program: &str, params: &[String]) -> (String, Vec<String>) {
    let line = std::iter::once(program)
        .chain(params.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ");

    let shell_name = Path::new(shell)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(shell)
        .to_ascii_lowercase();

    let flag = match shell_name.as_str() {
        "powershell" | "pwsh" => "-Command",
        "cmd" => "/C",
        _ => "-c",
    };

    (shell.to_string(), vec![flag.to_string(), line])
}

/// Resolve a requested working directory against the process snapshot
fn resolve_cwd(cwd: &Path, info: &ProcessInfo) -> Result<PathBuf, SpawnError> {
    let expanded = match (cwd.strip_prefix("~"), &info.home) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => cwd.to_path_buf(),
    };

    let absolute = if expanded.is_absolute() {
        expanded
    } else {
        info.cwd.join(expanded)
    };

    if absolute.is_dir() {
        Ok(absolute)
    } else {
        Err(SpawnError::InvalidCwd {
            path: cwd.to_path_buf(),
        })
    }
}

fn validate_env_key(key: &str) -> Result<(), SpawnError> {
    if key.is_empty() || key.contains('=') || key.contains('\0') {
        return Err(SpawnError::InvalidEnv {
            key: key.to_string(),
        });
    }
    Ok(())
}
