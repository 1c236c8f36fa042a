//! Session storage backing the sign-in flow.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{collections::HashMap, io::ErrorKind, path::PathBuf};
use tokio::{
    fs,
    io::{AsyncWriteExt, BufWriter},
};

use super::{ApiError, ApiResult};

/// Tokens of one signed-in account.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// True when the access token expires within `margin`.
    pub fn expires_within(&self, margin: Duration) -> bool {
        self.expires_at - margin <= Utc::now()
    }
}

/// Stores sessions in a local JSON file (session.json).
#[derive(Clone, Debug)]
pub struct FileSessionStore {
    /// Location of the session cache on disk.
    path: PathBuf,
}

impl FileSessionStore {
    /// Create a new store backed by the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Stable key for an (auth service, account) pair.
    fn entry_key(auth_url: &str, email: &str) -> String {
        let joined = format!(
            "{}\n{}",
            auth_url.trim_end_matches('/'),
            email.trim().to_lowercase()
        );
        let hash = Sha256::digest(joined.as_bytes());
        format!("session:{}", URL_SAFE_NO_PAD.encode(hash))
    }

    /// Load the entire session map from disk.
    async fn load_map(&self) -> ApiResult<HashMap<String, Session>> {
        match fs::read(&self.path).await {
            Ok(data) => {
                if data.is_empty() {
                    return Ok(HashMap::new());
                }
                serde_json::from_slice(&data).map_err(|e| ApiError::Session(e.to_string()))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(ApiError::Session(e.to_string())),
        }
    }

    /// Persist the session map, creating directories if needed.
    async fn save_map(&self, map: &HashMap<String, Session>) -> ApiResult<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| ApiError::Session(e.to_string()))?;
        }
        let data =
            serde_json::to_vec_pretty(map).map_err(|e| ApiError::Session(e.to_string()))?;
        let file = fs::File::create(&self.path)
            .await
            .map_err(|e| ApiError::Session(e.to_string()))?;
        let mut writer = BufWriter::new(file);
        writer
            .write_all(&data)
            .await
            .map_err(|e| ApiError::Session(e.to_string()))?;
        writer
            .flush()
            .await
            .map_err(|e| ApiError::Session(e.to_string()))?;
        Ok(())
    }

    /// Session for the account, if one was stored.
    pub async fn get(&self, auth_url: &str, email: &str) -> Option<Session> {
        let mut map = self.load_map().await.ok()?;
        map.remove(&Self::entry_key(auth_url, email))
    }

    /// Store or replace the session for the account.
    pub async fn set(&self, auth_url: &str, email: &str, session: Session) -> ApiResult<()> {
        let mut map = self.load_map().await?;
        map.insert(Self::entry_key(auth_url, email), session);
        self.save_map(&map).await
    }

    /// Forget the account's session.
    pub async fn remove(&self, auth_url: &str, email: &str) -> ApiResult<()> {
        let mut map = self.load_map().await?;
        if map.remove(&Self::entry_key(auth_url, email)).is_some() {
            self.save_map(&map).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("royalty_session_{}_{}.json", name, uuid::Uuid::new_v4()))
    }

    fn session(token: &str) -> Session {
        Session {
            access_token: token.into(),
            refresh_token: "r".into(),
            expires_at: Utc::now() + Duration::hours(1),
        }
    }

    #[tokio::test]
    async fn test_set_get_remove_roundtrip() {
        let path = temp_path("roundtrip");
        let store = FileSessionStore::new(&path);
        assert!(store.get("https://auth.example", "a@x").await.is_none());

        store.set("https://auth.example/", "A@x", session("t1")).await.unwrap();
        // Trailing slash and email case do not change the key.
        let got = store.get("https://auth.example", "a@x").await.unwrap();
        assert_eq!(got.access_token, "t1");

        store.remove("https://auth.example", "a@x").await.unwrap();
        assert!(store.get("https://auth.example", "a@x").await.is_none());
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_accounts_are_kept_apart() {
        let path = temp_path("accounts");
        let store = FileSessionStore::new(&path);
        store.set("https://auth.example", "a@x", session("ta")).await.unwrap();
        store.set("https://auth.example", "b@x", session("tb")).await.unwrap();
        assert_eq!(store.get("https://auth.example", "a@x").await.unwrap().access_token, "ta");
        assert_eq!(store.get("https://auth.example", "b@x").await.unwrap().access_token, "tb");
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_expires_within() {
        let mut s = session("t");
        assert!(!s.expires_within(Duration::seconds(60)));
        s.expires_at = Utc::now() + Duration::seconds(30);
        assert!(s.expires_within(Duration::seconds(60)));
    }
}
