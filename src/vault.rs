use serde::de::DeserializeOwned;
use tracing::{debug, error, warn};

use crate::models::{Session, StatusResponse, VaultItem};
use crate::process::{CommandOutput, Runner, SESSION_ENV};
use crate::storage::{unix_now, SessionStore};

/// Vault-level operations over the Bitwarden CLI. Owns the only in-memory
/// copy of the session; the store is a write-through mirror of it.
pub struct VaultClient<R: Runner> {
    runner: R,
    store: SessionStore,
    session: Option<Session>,
}

impl<R: Runner> VaultClient<R> {
    pub fn new(runner: R, store: SessionStore) -> Self {
        let session = store.load();
        Self {
            runner,
            store,
            session,
        }
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    #[cfg(test)]
    pub(crate) fn runner(&self) -> &R {
        &self.runner
    }

    pub fn check_available(&self) -> bool {
        self.runner.is_available()
    }

    pub fn is_logged_in(&self) -> bool {
        matches!(self.status().as_deref(), Some("unlocked") | Some("locked"))
    }

    pub fn is_unlocked(&mut self) -> bool {
        if self.has_live_session() {
            debug!("cached session still valid, skipping status query");
            return true;
        }
        self.status().as_deref() == Some("unlocked")
    }

    pub fn unlock(&mut self, password: &str) -> Option<String> {
        let output = self.invoke(&["unlock", password, "--raw"], None)?;
        if !output.success() {
            warn!(exit_code = ?output.exit_code, "unlock rejected");
            return None;
        }
        let token = output.stdout.trim().to_string();
        if token.is_empty() {
            warn!("unlock succeeded but returned no session token");
            return None;
        }
        debug!(token_len = token.len(), "vault unlocked");
        let session = match self.store.save(&token) {
            Ok(session) => session,
            Err(e) => {
                warn!("could not persist session, keeping it in memory only: {e}");
                Session::new(token.clone(), unix_now().unwrap_or_default())
            }
        };
        self.session = Some(session);
        Some(token)
    }

    pub fn lock(&mut self) -> bool {
        let locked = self
            .invoke(&["lock"], None)
            .map(|out| out.success())
            .unwrap_or(false);
        if !locked {
            warn!("bw lock failed, clearing local session anyway");
        }
        self.clear_session();
        locked
    }

    pub fn clear_session(&mut self) {
        self.session = None;
        self.store.clear();
    }

    pub fn sync(&self, session_override: Option<&str>) -> bool {
        self.invoke(&["sync"], session_override)
            .map(|out| out.success())
            .unwrap_or(false)
    }

    pub fn list_items(&self, session_override: Option<&str>) -> Vec<VaultItem> {
        let items: Vec<VaultItem> = self
            .fetch_json(&["list", "items"], session_override)
            .unwrap_or_default();
        debug!(count = items.len(), "listed vault items");
        items
    }

    pub fn search_items(&self, query: &str, session_override: Option<&str>) -> Vec<VaultItem> {
        self.fetch_json(&["list", "items", "--search", query], session_override)
            .unwrap_or_default()
    }

    pub fn get_item(&self, id: &str, session_override: Option<&str>) -> Option<VaultItem> {
        self.fetch_json(&["get", "item", id], session_override)
    }

    fn has_live_session(&mut self) -> bool {
        let Some(session) = &self.session else {
            return false;
        };
        let now = match unix_now() {
            Ok(now) => now,
            Err(e) => {
                warn!("{e}");
                return false;
            }
        };
        if session.is_valid_at(now) {
            return true;
        }
        debug!("cached session expired");
        self.clear_session();
        false
    }

    fn status(&self) -> Option<String> {
        let response: StatusResponse = self.fetch_json(&["status"], None)?;
        debug!(status = ?response.status, "vault status");
        response.status
    }

    fn fetch_json<T: DeserializeOwned>(
        &self,
        args: &[&str],
        session_override: Option<&str>,
    ) -> Option<T> {
        let output = self.invoke(args, session_override)?;
        if !output.success() {
            error!(
                command = args.first().copied().unwrap_or(""),
                exit_code = ?output.exit_code,
                stderr = output.stderr.trim(),
                "vault command failed"
            );
            return None;
        }
        match serde_json::from_str(&output.stdout) {
            Ok(value) => Some(value),
            Err(e) => {
                error!(command = args.first().copied().unwrap_or(""), "unparseable output: {e}");
                None
            }
        }
    }

    fn invoke(&self, args: &[&str], session_override: Option<&str>) -> Option<CommandOutput> {
        let token = session_override.or(self.session.as_ref().map(|s| s.token.as_str()));
        let env: Vec<(&str, &str)> = token.map(|t| (SESSION_ENV, t)).into_iter().collect();
        match self.runner.run(args, &env) {
            Ok(output) => Some(output),
            Err(e) => {
                error!("{e:#}");
                None
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FakeRunner;
    use super::*;

    const ITEMS_JSON: &str = r#"[
        {"id":"1","name":"GitHub","login":{"username":"alice","password":"gh-pass"}},
        {"id":"2","name":"AWS","login":{"username":"bob","password":null}}
    ]"#;

    fn client(runner: FakeRunner, dir: &tempfile::TempDir) -> VaultClient<FakeRunner> {
        VaultClient::new(runner, SessionStore::new(dir.path().join("session.json")))
    }

    #[test]
    fn logged_in_covers_locked_and_unlocked() {
        let dir = tempfile::tempdir().unwrap();
        for (status, expected) in [
            ("unlocked", true),
            ("locked", true),
            ("unauthenticated", false),
        ] {
            let runner =
                FakeRunner::default().respond("status", 0, &format!(r#"{{"status":"{status}"}}"#));
            assert_eq!(client(runner, &dir).is_logged_in(), expected, "{status}");
        }
    }

    #[test]
    fn status_failures_mean_not_logged_in() {
        let dir = tempfile::tempdir().unwrap();
        let broken = FakeRunner::default().respond("status", 0, "not json");
        assert!(!client(broken, &dir).is_logged_in());
        let failing = FakeRunner::default().respond("status", 1, r#"{"status":"unlocked"}"#);
        assert!(!client(failing, &dir).is_logged_in());
        let missing = FakeRunner::default().fail_to_spawn("status");
        assert!(!client(missing, &dir).is_logged_in());
    }

    #[test]
    fn unlock_persists_and_short_circuits_status() {
        let dir = tempfile::tempdir().unwrap();
        let runner = FakeRunner::default()
            .respond("status", 0, r#"{"status":"locked"}"#)
            .respond("unlock", 0, "session-token\n");
        let mut vault = client(runner, &dir);

        assert!(!vault.is_unlocked());
        assert_eq!(vault.unlock("hunter2").as_deref(), Some("session-token"));
        assert!(vault.is_unlocked());
        assert_eq!(vault.runner.count("status"), 1);

        let stored = SessionStore::new(dir.path().join("session.json")).load().unwrap();
        assert_eq!(stored.token, "session-token");
    }

    #[test]
    fn failed_unlock_returns_none_and_caches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let runner = FakeRunner::default().respond("unlock", 1, "");
        let mut vault = client(runner, &dir);
        assert_eq!(vault.unlock("wrong"), None);
        assert!(vault.session().is_none());
        assert!(SessionStore::new(dir.path().join("session.json")).load().is_none());
    }

    #[test]
    fn empty_token_on_success_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let runner = FakeRunner::default().respond("unlock", 0, "  \n");
        let mut vault = client(runner, &dir);
        assert_eq!(vault.unlock("pw"), None);
        assert!(vault.session().is_none());
    }

    #[test]
    fn lock_clears_session_even_when_tool_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("session.json"));
        store.save("cached").unwrap();

        let runner = FakeRunner::default().respond("lock", 1, "");
        let mut vault = client(runner, &dir);
        assert!(vault.session().is_some());

        assert!(!vault.lock());
        assert!(vault.session().is_none());
        assert!(store.load().is_none());
    }

    #[test]
    fn expired_in_memory_session_falls_back_to_status() {
        let dir = tempfile::tempdir().unwrap();
        let runner = FakeRunner::default().respond("status", 0, r#"{"status":"unlocked"}"#);
        let mut vault = client(runner, &dir);
        vault.session = Some(Session::new("old", 1));

        assert!(vault.is_unlocked());
        assert_eq!(vault.runner.count("status"), 1);
        assert!(vault.session().is_none());
    }

    #[test]
    fn list_attaches_cached_token_and_parses_items() {
        let dir = tempfile::tempdir().unwrap();
        SessionStore::new(dir.path().join("session.json"))
            .save("cached")
            .unwrap();
        let runner = FakeRunner::default().respond("list", 0, ITEMS_JSON);
        let vault = client(runner, &dir);

        let items = vault.list_items(None);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].password(), Some("gh-pass"));
        assert_eq!(items[1].password(), None);

        let call = vault.runner.last_call("list").unwrap();
        assert_eq!(call.args, ["list", "items"]);
        assert_eq!(call.env, [(SESSION_ENV.to_string(), "cached".to_string())]);
    }

    #[test]
    fn explicit_session_overrides_cached_one() {
        let dir = tempfile::tempdir().unwrap();
        SessionStore::new(dir.path().join("session.json"))
            .save("cached")
            .unwrap();
        let runner = FakeRunner::default().respond("list", 0, "[]");
        let vault = client(runner, &dir);

        vault.search_items("git", Some("fresh"));
        let call = vault.runner.last_call("list").unwrap();
        assert_eq!(call.args, ["list", "items", "--search", "git"]);
        assert_eq!(call.env, [(SESSION_ENV.to_string(), "fresh".to_string())]);
    }

    #[test]
    fn no_session_means_no_env_overlay() {
        let dir = tempfile::tempdir().unwrap();
        let runner = FakeRunner::default().respond("sync", 0, "Syncing complete.");
        let vault = client(runner, &dir);
        assert!(vault.sync(None));
        assert!(vault.runner.last_call("sync").unwrap().env.is_empty());
    }

    #[test]
    fn transient_failures_yield_empty_results() {
        let dir = tempfile::tempdir().unwrap();
        let runner = FakeRunner::default()
            .respond("list", 0, "You are not logged in.")
            .respond("get", 1, "Not found.");
        let vault = client(runner, &dir);
        assert!(vault.list_items(None).is_empty());
        assert!(vault.get_item("missing", None).is_none());
    }

    #[test]
    fn null_name_record_keeps_rest_of_listing() {
        let dir = tempfile::tempdir().unwrap();
        let runner = FakeRunner::default().respond(
            "list",
            0,
            r#"[{"id":"1","name":"GitHub","login":{"username":"alice","password":"gh-pass"}},
                {"id":"2","name":null,"login":null}]"#,
        );
        let vault = client(runner, &dir);

        let items = vault.list_items(None);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].name, "GitHub");
        assert_eq!(items[1].name, "");
        assert_eq!(items[1].password(), None);
    }

    #[test]
    fn unwritable_store_keeps_session_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "plain file").unwrap();
        let store = SessionStore::new(blocker.join("session.json"));

        let runner = FakeRunner::default()
            .respond("status", 0, r#"{"status":"locked"}"#)
            .respond("unlock", 0, "mem-token");
        let mut vault = VaultClient::new(runner, store);

        assert_eq!(vault.unlock("pw").as_deref(), Some("mem-token"));
        assert_eq!(vault.session().map(|s| s.token.as_str()), Some("mem-token"));
        assert!(vault.is_unlocked());
        assert_eq!(vault.runner.count("status"), 0);
        assert!(!blocker.join("session.json").exists());
    }

    #[test]
    fn get_item_fetches_single_record() {
        let dir = tempfile::tempdir().unwrap();
        let runner = FakeRunner::default().respond(
            "get",
            0,
            r#"{"id":"2","name":"AWS","login":{"username":"bob","password":"aws-pass"}}"#,
        );
        let vault = client(runner, &dir);
        let item = vault.get_item("2", None).unwrap();
        assert_eq!(item.password(), Some("aws-pass"));
        assert_eq!(vault.runner.last_call("get").unwrap().args, ["get", "item", "2"]);
    }
}
