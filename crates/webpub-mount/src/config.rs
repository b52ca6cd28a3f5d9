//! Resolved settings for publish and recovery.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default document root served by the web server.
pub const DEFAULT_DOCROOT: &str = "/var/www/html";

/// Default runtime directory holding one record per active publish.
pub const DEFAULT_STATE_DIR: &str = "/run/webpub";

/// Default identity the web server runs as.
pub const DEFAULT_SERVER_USER: &str = "www-data";

/// Settings shared by every component.
///
/// Missing keys in a config file fall back to the Debian/Apache defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PublishConfig {
    /// Directory the web server serves
    pub docroot: PathBuf,

    /// Directory holding the `<alias>.path` records
    pub state_dir: PathBuf,

    /// User the web server runs as (receives the ACL grants)
    pub server_user: String,

    /// Command that asks the web server to reload
    pub reload_command: Vec<String>,

    /// Base of the URL printed for a publish
    pub base_url: String,

    /// Seconds between SIGTERM and SIGKILL when ending lingering sessions
    pub kill_grace_secs: u64,

    /// Directory for daily-rolling log files (stderr only when unset)
    pub log_dir: Option<PathBuf>,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            docroot: PathBuf::from(DEFAULT_DOCROOT),
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
            server_user: DEFAULT_SERVER_USER.to_string(),
            reload_command: vec![
                "systemctl".to_string(),
                "reload".to_string(),
                "apache2".to_string(),
            ],
            base_url: "http://localhost".to_string(),
            kill_grace_secs: 2,
            log_dir: None,
        }
    }
}

impl PublishConfig {
    /// URL under which `alias` is reachable.
    pub fn url_for(&self, alias: &str) -> String {
        format!("{}/{alias}", self.base_url.trim_end_matches('/'))
    }

    /// Destination directory for `alias`.
    pub fn destination_for(&self, alias: &str) -> PathBuf {
        self.docroot.join(alias)
    }
}
