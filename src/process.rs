use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{Context, Result};
use tracing::debug;

pub const BW_BINARY: &str = "bw";
pub const SESSION_ENV: &str = "BW_SESSION";

const KNOWN_INSTALL_PATHS: [&str; 3] = ["/usr/local/bin/bw", "/opt/homebrew/bin/bw", "/usr/bin/bw"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs the vault tool. `Err` only when the process could not be started;
/// a non-zero exit is an `Ok` output with `success() == false`.
pub trait Runner {
    fn run(&self, args: &[&str], extra_env: &[(&str, &str)]) -> Result<CommandOutput>;

    fn is_available(&self) -> bool;
}

pub struct ProcessInvoker {
    program: PathBuf,
}

impl ProcessInvoker {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn locate(configured: Option<&Path>) -> Self {
        let program = locate_binary(configured, std::env::var_os("PATH"))
            .unwrap_or_else(|| PathBuf::from(BW_BINARY));
        debug!(program = %program.display(), "resolved vault binary");
        Self::new(program)
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl Runner for ProcessInvoker {
    fn run(&self, args: &[&str], extra_env: &[(&str, &str)]) -> Result<CommandOutput> {
        // args may carry the master password; only the subcommand is logged
        debug!(
            subcommand = args.first().copied().unwrap_or(""),
            env_overlay = extra_env.len(),
            "running vault tool"
        );
        let output = Command::new(&self.program)
            .args(args)
            .envs(extra_env.iter().copied())
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("Failed to run {}", self.program.display()))?;
        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        })
    }

    fn is_available(&self) -> bool {
        if self.program.components().count() > 1 {
            return is_executable(&self.program);
        }
        locate_in_path(&self.program, std::env::var_os("PATH")).is_some()
    }
}

pub fn locate_binary(configured: Option<&Path>, path_var: Option<OsString>) -> Option<PathBuf> {
    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Some(path) = configured {
        candidates.push(path.to_path_buf());
    }
    candidates.extend(KNOWN_INSTALL_PATHS.iter().map(PathBuf::from));
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(".local/bin").join(BW_BINARY));
    }
    if let Some(found) = candidates.into_iter().find(|p| is_executable(p)) {
        return Some(found);
    }
    locate_in_path(Path::new(BW_BINARY), path_var)
}

fn locate_in_path(name: &Path, path_var: Option<OsString>) -> Option<PathBuf> {
    let path_var = path_var?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        match std::fs::metadata(path) {
            Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
            Err(_) => false,
        }
    }
    #[cfg(not(unix))]
    {
        path.is_file()
    }
}
