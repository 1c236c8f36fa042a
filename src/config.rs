//! Config model and persistence helpers.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

/// Top-level configuration stored in `config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Web app exposing `/api/admin/reports`.
    pub api: ApiCfg,
    /// Auth service used to obtain bearer tokens.
    pub auth: AuthCfg,
    /// Admin account used to sign in.
    pub account: AccountCfg,
    /// Pacing of report submissions.
    #[serde(default)]
    pub upload: UploadCfg,
    /// Status polling policy.
    #[serde(default)]
    pub poll: PollCfg,
    /// HTTP client settings.
    #[serde(default)]
    pub http: HttpCfg,
}

/// Reports API location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiCfg {
    /// Origin of the web app, e.g. `https://label.example`.
    pub base_url: String,
}

/// Auth service location and public key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthCfg {
    /// Origin of the auth service.
    pub url: String,
    /// Public (anon) API key sent as the `apikey` header.
    pub anon_key: String,
}

/// Account values; the password is never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountCfg {
    pub email: String,
}

/// Delays applied around archive submissions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadCfg {
    /// Pause between two quarters of an archive.
    pub inter_request_delay_ms: u64,
    /// Wait after the last quarter before the list is refreshed.
    pub settle_delay_ms: u64,
}

/// Backoff and timeout for status polling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollCfg {
    /// First wait between polls.
    pub initial_interval_ms: u64,
    /// Upper bound for the wait.
    pub max_interval_ms: u64,
    /// Growth of the wait after a poll without progress.
    pub backoff_factor: f64,
    /// Give up after this long and let the user resume.
    pub timeout_secs: u64,
}

/// HTTP client knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpCfg {
    pub connect_timeout_secs: u64,
}

impl Default for UploadCfg {
    fn default() -> Self {
        Self {
            inter_request_delay_ms: 500,
            settle_delay_ms: 3000,
        }
    }
}

impl Default for PollCfg {
    fn default() -> Self {
        Self {
            initial_interval_ms: 1000,
            max_interval_ms: 10_000,
            backoff_factor: 1.5,
            timeout_secs: 900,
        }
    }
}

impl Default for HttpCfg {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
        }
    }
}

impl Config {
    /// Load from disk or create defaults when missing.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            let s = fs::read_to_string(path)?;
            Ok(toml::from_str(&s)?)
        } else {
            let cfg = Self::default();
            cfg.save(path)?;
            Ok(cfg)
        }
    }

    /// Persist the config as pretty TOML.
    pub fn save(&self, path: &Path) -> Result<()> {
        let s = toml::to_string_pretty(self)?;
        fs::write(path, s)?;
        Ok(())
    }

    /// Names of required values that are still empty.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut v = vec![];
        if self.api.base_url.trim().is_empty() {
            v.push("api.base_url");
        }
        if self.auth.url.trim().is_empty() {
            v.push("auth.url");
        }
        if self.auth.anon_key.trim().is_empty() {
            v.push("auth.anon_key");
        }
        if self.account.email.trim().is_empty() {
            v.push("account.email");
        }
        v
    }
}

impl Default for Config {
    /// Endpoints start empty; the setup wizard fills them in.
    fn default() -> Self {
        Self {
            api: ApiCfg {
                base_url: "".into(),
            },
            auth: AuthCfg {
                url: "".into(),
                anon_key: "".into(),
            },
            account: AccountCfg { email: "".into() },
            upload: UploadCfg::default(),
            poll: PollCfg::default(),
            http: HttpCfg::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_written_and_reloaded() {
        let path = std::env::temp_dir().join(format!("royalty_cfg_{}.toml", uuid::Uuid::new_v4()));
        let cfg = Config::load_or_default(&path).unwrap();
        assert!(path.exists());
        assert_eq!(cfg.upload.inter_request_delay_ms, 500);
        assert_eq!(cfg.poll.initial_interval_ms, 1000);

        let mut edited = cfg.clone();
        edited.api.base_url = "https://label.example".into();
        edited.save(&path).unwrap();
        assert_eq!(Config::load_or_default(&path).unwrap(), edited);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_optional_sections_fall_back_to_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            [api]
            base_url = "https://label.example"
            [auth]
            url = "https://auth.example"
            anon_key = "anon"
            [account]
            email = "admin@label.example"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.upload, UploadCfg::default());
        assert_eq!(cfg.poll, PollCfg::default());
        assert!(cfg.missing_fields().is_empty());
        assert_eq!(
            Config::default().missing_fields(),
            vec!["api.base_url", "auth.url", "auth.anon_key", "account.email"]
        );
    }
}
