use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::PathBuf;

const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";

pub struct Config {
    pub db_path: PathBuf,
    pub data_dir: PathBuf,
}

/// Remote chat settings, read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatConfig {
    pub api_key: String,
    pub model: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        let data_dir = match std::env::var_os("CATLOG_DATA_DIR") {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => ProjectDirs::from("", "", "catlog")
                .context("Could not determine home directory")?
                .data_dir()
                .to_path_buf(),
        };
        Self::at(data_dir)
    }

    pub fn at(data_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        let db_path = data_dir.join("catlog.db");
        tracing::debug!(path = %db_path.display(), "using database");

        Ok(Config { db_path, data_dir })
    }

    /// Load the API key from disk, or generate a new one.
    ///
    /// Returns `(key, newly_created)` where `newly_created` is true when a
    /// fresh key was just generated (first run).
    pub fn load_or_create_api_key(&self) -> Result<(String, bool)> {
        use rand::Rng;
        use std::fmt::Write;

        let path = self.data_dir.join("api_key");

        if path.exists() {
            let key = std::fs::read_to_string(&path).context("Failed to read API key file")?;
            let key = key.trim().to_string();
            if !key.is_empty() {
                return Ok((key, false));
            }
        }

        let bytes: [u8; 32] = rand::rng().random();
        let key = bytes
            .iter()
            .fold(String::with_capacity(64), |mut acc: String, b| {
                let _ = write!(acc, "{b:02x}");
                acc
            });
        std::fs::write(&path, &key).context("Failed to write API key file")?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
                .context("Failed to set API key file permissions")?;
        }
        tracing::info!(path = %path.display(), "generated new API key");
        Ok((key, true))
    }
}

impl ChatConfig {
    /// `None` when `GEMINI_API_KEY` is unset or blank.
    pub fn from_env() -> Option<Self> {
        Self::from_vars(
            std::env::var("GEMINI_API_KEY").ok(),
            std::env::var("CATLOG_GEMINI_MODEL").ok(),
        )
    }

    fn from_vars(api_key: Option<String>, model: Option<String>) -> Option<Self> {
        let api_key = api_key.map(|k| k.trim().to_string()).filter(|k| !k.is_empty())?;
        let model = model
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string());
        Some(Self { api_key, model })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_at_creates_dir() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("nested").join("catlog");
        let config = Config::at(data_dir.clone()).unwrap();
        assert!(data_dir.is_dir());
        assert_eq!(config.db_path, data_dir.join("catlog.db"));
    }

    #[test]
    fn test_api_key_generated_once() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::at(dir.path().to_path_buf()).unwrap();

        let (key, created) = config.load_or_create_api_key().unwrap();
        assert!(created);
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));

        let (again, created) = config.load_or_create_api_key().unwrap();
        assert!(!created);
        assert_eq!(again, key);
    }

    #[test]
    fn test_chat_config_requires_key() {
        assert!(ChatConfig::from_vars(None, None).is_none());
        assert!(ChatConfig::from_vars(Some("  ".to_string()), None).is_none());
    }

    #[test]
    fn test_chat_config_model_default() {
        let config = ChatConfig::from_vars(Some("abc".to_string()), None).unwrap();
        assert_eq!(config.model, DEFAULT_GEMINI_MODEL);

        let config =
            ChatConfig::from_vars(Some("abc".to_string()), Some("gemini-1.5-pro".to_string()))
                .unwrap();
        assert_eq!(config.model, "gemini-1.5-pro");
    }
}
