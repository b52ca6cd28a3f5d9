//! Configuration file support for the webpub CLI.
//!
//! The first existing file wins:
//!
//! 1. `--config <FILE>` (must exist)
//! 2. `$WEBPUB_CONFIG_DIR/config.toml`
//! 3. `~/.config/webpub/config.toml` (XDG config dir)
//! 4. `/etc/webpub/config.toml`
//!
//! No file means built-in defaults. Environment overrides are applied on top.
//!
//! # Example configuration
//!
//! ```toml
//! docroot = "/srv/http"
//! state_dir = "/run/webpub"
//! server_user = "http"
//! reload_command = ["systemctl", "reload", "nginx"]
//! base_url = "http://devbox.local"
//! kill_grace_secs = 2
//! log_dir = "/var/log/webpub"
//! ```

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use webpub_mount::PublishConfig;

/// Directory overriding where `config.toml` is looked up.
pub const CONFIG_DIR_ENV: &str = "WEBPUB_CONFIG_DIR";

/// System-wide configuration file.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/webpub/config.toml";

const CONFIG_FILE: &str = "config.toml";

/// Load the effective configuration.
pub fn load(explicit: Option<&Path>) -> Result<PublishConfig> {
    let mut config = match locate(explicit)? {
        Some(path) => {
            tracing::debug!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            parse(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        }
        None => PublishConfig::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var_os(key));
    Ok(config)
}

fn parse(content: &str) -> Result<PublishConfig> {
    Ok(toml::from_str(content)?)
}

/// Path of the configuration file to use, if any.
pub fn locate(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        if !path.is_file() {
            bail!("Config file does not exist: {}", path.display());
        }
        return Ok(Some(path.to_path_buf()));
    }

    Ok(candidates().into_iter().find(|path| path.is_file()))
}

/// Lookup order for the configuration file.
pub fn candidates() -> Vec<PathBuf> {
    if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV) {
        return vec![PathBuf::from(dir).join(CONFIG_FILE)];
    }

    let mut paths = Vec::new();
    if let Some(base_dirs) = directories::BaseDirs::new() {
        paths.push(base_dirs.config_dir().join("webpub").join(CONFIG_FILE));
    }
    paths.push(PathBuf::from(SYSTEM_CONFIG_PATH));
    paths
}

/// Apply `WEBPUB_*` overrides, read through `lookup`.
pub fn apply_env_overrides<F>(config: &mut PublishConfig, lookup: F)
where
    F: Fn(&str) -> Option<OsString>,
{
    let value = |key: &str| lookup(key).filter(|value| !value.is_empty());

    if let Some(docroot) = value("WEBPUB_DOCROOT") {
        config.docroot = PathBuf::from(docroot);
    }
    if let Some(state_dir) = value("WEBPUB_STATE_DIR") {
        config.state_dir = PathBuf::from(state_dir);
    }
    if let Some(user) = value("WEBPUB_SERVER_USER") {
        config.server_user = user.to_string_lossy().into_owned();
    }
    if let Some(url) = value("WEBPUB_BASE_URL") {
        config.base_url = url.to_string_lossy().into_owned();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_parse_empty_config() {
        let config = parse("").unwrap();
        assert_eq!(config, PublishConfig::default());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            docroot = "/srv/http"
            state_dir = "/tmp/webpub-state"
            server_user = "http"
            reload_command = ["nginx", "-s", "reload"]
            base_url = "https://devbox.local/"
            kill_grace_secs = 5
            log_dir = "/var/log/webpub"
        "#;

        let config = parse(toml).unwrap();

        assert_eq!(config.docroot, PathBuf::from("/srv/http"));
        assert_eq!(config.state_dir, PathBuf::from("/tmp/webpub-state"));
        assert_eq!(config.server_user, "http");
        assert_eq!(config.reload_command, vec!["nginx", "-s", "reload"]);
        assert_eq!(config.kill_grace_secs, 5);
        assert_eq!(config.log_dir, Some(PathBuf::from("/var/log/webpub")));
        assert_eq!(config.url_for("site"), "https://devbox.local/site");
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config = parse("server_user = \"nginx\"").unwrap();
        assert_eq!(config.server_user, "nginx");
        assert_eq!(config.docroot, PublishConfig::default().docroot);
    }

    #[test]
    fn test_unknown_type_is_an_error() {
        assert!(parse("kill_grace_secs = \"soon\"").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("WEBPUB_DOCROOT", "/srv/www"),
            ("WEBPUB_STATE_DIR", "/tmp/state"),
            ("WEBPUB_BASE_URL", ""),
        ]);
        let mut config = PublishConfig::default();

        apply_env_overrides(&mut config, |key| env.get(key).map(OsString::from));

        assert_eq!(config.docroot, PathBuf::from("/srv/www"));
        assert_eq!(config.state_dir, PathBuf::from("/tmp/state"));
        // empty values are ignored
        assert_eq!(config.base_url, PublishConfig::default().base_url);
        assert_eq!(config.server_user, PublishConfig::default().server_user);
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let err = locate(Some(Path::new("/nonexistent/webpub.toml"))).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_explicit_file_is_loaded() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("webpub.toml");
        std::fs::write(&path, "docroot = \"/srv/explicit\"").unwrap();

        let config = load(Some(&path)).unwrap();
        // an environment override would win, so only check when none is set
        if std::env::var_os("WEBPUB_DOCROOT").is_none() {
            assert_eq!(config.docroot, PathBuf::from("/srv/explicit"));
        }
    }
}
