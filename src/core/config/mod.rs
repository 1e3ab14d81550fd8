//! Application configuration.
//!
//! Settings are read from `config.yml` (next to the binary, or wherever
//! `CODEDESK_CONFIG_PATH` points) and merged with environment overrides for
//! the values that must not be committed: the blob SAS token and the model
//! API key.

pub mod paths;

use std::env;
use std::fs;
use std::path::PathBuf;

use serde::Deserialize;

pub use paths::AppPaths;

use crate::core::errors::ApiError;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub blob: BlobSettings,
    pub retrieval: RetrievalSettings,
    pub citations: CitationSettings,
    pub llm: LlmSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub port: u16,
    pub allowed_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: 8000,
            allowed_origins: Vec::new(),
        }
    }
}

/// Object store backend selection.
///
/// `fs` serves a local directory as the container (development, tests);
/// `azure` talks to a blob container REST endpoint with a SAS token.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BlobSettings {
    pub backend: String,
    pub container_url: String,
    pub sas_token: String,
    pub fs_root: PathBuf,
    pub vectorstore_prefix: String,
    pub pdf_prefix: String,
}

impl Default for BlobSettings {
    fn default() -> Self {
        Self {
            backend: "fs".to_string(),
            container_url: String::new(),
            sas_token: String::new(),
            fs_root: PathBuf::from("blob_data"),
            vectorstore_prefix: "vectorstores".to_string(),
            pdf_prefix: "pdfs".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    /// Retrieval fan-out. A tunable constant, not user input: it bounds both
    /// embedding cost and prompt size.
    pub top_k: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self { top_k: 4 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CitationSettings {
    /// When the minimum retrieved page number is 0, treat the whole
    /// document's page metadata as 0-based and shift it to 1-based.
    /// Upstream index builders disagree on indexing; deployments whose
    /// indexes are known 1-based can turn this off.
    pub shift_zero_based: bool,
}

impl Default for CitationSettings {
    fn default() -> Self {
        Self {
            shift_zero_based: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub base_url: String,
    pub api_key: String,
    pub chat_model: String,
    pub embed_model: String,
    pub max_tokens: Option<u32>,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:1234".to_string(),
            api_key: String::new(),
            chat_model: "gpt-4o-mini".to_string(),
            embed_model: "text-embedding-3-small".to_string(),
            max_tokens: None,
        }
    }
}

impl Settings {
    /// Load settings from `config.yml`, then apply environment overrides.
    ///
    /// A missing config file is not an error: every field has a default and
    /// containerized deployments often configure through the environment
    /// alone.
    pub fn load(paths: &AppPaths) -> Result<Self, ApiError> {
        let config_path = config_path(paths);
        let mut settings = if config_path.exists() {
            let contents = fs::read_to_string(&config_path).map_err(|e| {
                ApiError::Internal(format!("failed to read {}: {}", config_path.display(), e))
            })?;
            serde_yaml::from_str::<Settings>(&contents).map_err(|e| {
                ApiError::Internal(format!("failed to parse {}: {}", config_path.display(), e))
            })?
        } else {
            Settings::default()
        };

        settings.apply_env_overrides();
        settings.validate()?;
        Ok(settings)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(value) = env::var("CODEDESK_BLOB_BACKEND") {
            self.blob.backend = value;
        }
        if let Ok(value) = env::var("CODEDESK_CONTAINER_URL") {
            self.blob.container_url = value;
        }
        if let Ok(value) = env::var("CODEDESK_SAS_TOKEN") {
            self.blob.sas_token = value;
        }
        if let Ok(value) = env::var("CODEDESK_LLM_BASE_URL") {
            self.llm.base_url = value;
        }
        if let Ok(value) = env::var("CODEDESK_LLM_API_KEY") {
            self.llm.api_key = value;
        }
        if let Ok(value) = env::var("PORT") {
            if let Ok(port) = value.parse::<u16>() {
                self.server.port = port;
            }
        }
    }

    fn validate(&self) -> Result<(), ApiError> {
        match self.blob.backend.as_str() {
            "fs" => {}
            "azure" => {
                if self.blob.container_url.trim().is_empty() {
                    return Err(ApiError::Internal(
                        "blob.backend is 'azure' but blob.container_url is empty".to_string(),
                    ));
                }
            }
            other => {
                return Err(ApiError::Internal(format!(
                    "unknown blob.backend '{}' (expected 'fs' or 'azure')",
                    other
                )));
            }
        }

        if self.retrieval.top_k == 0 {
            return Err(ApiError::Internal(
                "retrieval.top_k must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

fn config_path(paths: &AppPaths) -> PathBuf {
    if let Ok(path) = env::var("CODEDESK_CONFIG_PATH") {
        return PathBuf::from(path);
    }

    let user_config = paths.user_data_dir.join("config.yml");
    if user_config.exists() {
        return user_config;
    }

    paths.project_root.join("config.yml")
}
