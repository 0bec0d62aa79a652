use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::Session;

pub const APP_DIR: &str = ".bw-tui";
pub const SESSION_FILE: &str = "session.json";
pub const CONFIG_FILE: &str = "config.json";
const DEFAULT_CLIPBOARD_CLEAR_SECS: u64 = 20;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub bw_path: Option<PathBuf>,
    #[serde(default = "default_clipboard_clear_secs")]
    pub clipboard_clear_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bw_path: None,
            clipboard_clear_secs: DEFAULT_CLIPBOARD_CLEAR_SECS,
        }
    }
}

fn default_clipboard_clear_secs() -> u64 {
    DEFAULT_CLIPBOARD_CLEAR_SECS
}

pub fn default_base_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| anyhow!("Could not determine home directory"))?;
    Ok(home.join(APP_DIR))
}

pub fn config_path() -> Result<PathBuf> {
    Ok(default_base_dir()?.join(CONFIG_FILE))
}

pub fn session_path() -> Result<PathBuf> {
    Ok(default_base_dir()?.join(SESSION_FILE))
}

pub fn load_config() -> Result<Config> {
    load_config_from(&config_path()?)
}

pub fn load_config_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid config file {}", path.display()))
}

pub fn unix_now() -> Result<u64> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| anyhow!("Clock error: {e}"))?;
    Ok(now.as_secs())
}

/// Single-slot, write-through cache of the session token. Absent, malformed
/// and stale records all read back as "no session" and are removed.
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn open_default() -> Result<Self> {
        Ok(Self::new(session_path()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Option<Session> {
        match unix_now() {
            Ok(now) => self.load_at(now),
            Err(e) => {
                warn!("cannot read clock, ignoring stored session: {e}");
                None
            }
        }
    }

    pub fn load_at(&self, now: u64) -> Option<Session> {
        if !self.path.exists() {
            return None;
        }
        let session = fs::read_to_string(&self.path)
            .map_err(anyhow::Error::from)
            .and_then(|raw| serde_json::from_str::<Session>(&raw).map_err(anyhow::Error::from));
        match session {
            Ok(session) if session.is_valid_at(now) => {
                debug!(token_len = session.token.len(), "loaded stored session");
                Some(session)
            }
            Ok(_) => {
                debug!("stored session expired, removing");
                self.clear();
                None
            }
            Err(e) => {
                warn!("discarding unreadable session file: {e}");
                self.clear();
                None
            }
        }
    }

    pub fn save(&self, token: &str) -> Result<Session> {
        self.save_at(token, unix_now()?)
    }

    pub fn save_at(&self, token: &str, now: u64) -> Result<Session> {
        let session = Session::new(token, now);
        let data = serde_json::to_string_pretty(&session)?;
        atomic_write(&self.path, data.as_bytes())?;
        restrict_file(&self.path)?;
        Ok(session)
    }

    pub fn clear(&self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!("session file removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("failed to remove session file: {e}"),
        }
    }
}

fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path.parent().ok_or_else(|| anyhow!("Invalid target path"))?;
    if !parent.exists() {
        fs::create_dir_all(parent)?;
        restrict_dir(parent)?;
    }

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(bytes)?;
    temp.flush()?;
    temp.as_file().sync_all()?;
    temp.persist(path)
        .map_err(|e| anyhow!("Atomic write failed: {}", e.error))?;
    Ok(())
}

fn restrict_file(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if path.exists() {
            fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
        }
    }
    Ok(())
}

fn restrict_dir(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if path.exists() {
            fs::set_permissions(path, fs::Permissions::from_mode(0o700))?;
        }
    }
    Ok(())
}
