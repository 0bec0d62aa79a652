use serde::{Deserialize, Deserializer, Serialize};

pub const SESSION_TTL_SECS: u64 = 10 * 60;

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Login {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct VaultItem {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub name: String,
    #[serde(default)]
    pub login: Option<Login>,
}

// bw prints `"name": null` for some records; one of those must not sink the
// whole listing.
fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl VaultItem {
    pub fn username(&self) -> Option<&str> {
        self.login.as_ref().and_then(|l| l.username.as_deref())
    }

    pub fn password(&self) -> Option<&str> {
        self.login
            .as_ref()
            .and_then(|l| l.password.as_deref())
            .filter(|p| !p.is_empty())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Session {
    #[serde(rename = "session_key")]
    pub token: String,
    #[serde(rename = "timestamp")]
    pub issued_at: u64,
}

impl Session {
    pub fn new(token: impl Into<String>, issued_at: u64) -> Self {
        Self {
            token: token.into(),
            issued_at,
        }
    }

    /// Valid while `now - issued_at < TTL` and the token is non-empty. A
    /// timestamp ahead of `now` never validates.
    pub fn is_valid_at(&self, now: u64) -> bool {
        if self.token.is_empty() || self.issued_at > now {
            return false;
        }
        now - self.issued_at < SESSION_TTL_SECS
    }
}

#[derive(Deserialize, Debug)]
pub struct StatusResponse {
    #[serde(default)]
    pub status: Option<String>,
}
