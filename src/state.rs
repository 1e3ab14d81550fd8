use std::sync::Arc;

use thiserror::Error;

use crate::answer::AnswerService;
use crate::catalog::CatalogService;
use crate::core::config::{AppPaths, Settings};
use crate::llm::{LlmProvider, OpenAiCompatProvider};
use crate::storage::{AzureBlobStore, BlobStore, FsBlobStore};
use crate::vectorstore::VectorstoreManager;

#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("Failed to load configuration: {0}")]
    Config(#[source] anyhow::Error),
}

/// Global application state shared across all routes.
///
/// Holds the configuration, the object store client, the catalog snapshot,
/// the vectorstore cache and the model provider.
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub settings: Settings,
    pub blob: Arc<dyn BlobStore>,
    pub catalog: Arc<CatalogService>,
    pub vectorstores: Arc<VectorstoreManager>,
    pub llm: Arc<dyn LlmProvider>,
    pub answer: AnswerService,
}

impl AppState {
    /// Initializes the application state.
    ///
    /// Builds the blob client from settings, then attempts an initial
    /// catalog build. A failed build is logged and the process starts with
    /// an empty catalog; `/api/catalog/refresh` can repair it once the
    /// object store is reachable again.
    pub async fn initialize() -> Result<Arc<Self>, InitializationError> {
        let paths = Arc::new(AppPaths::new());
        let settings =
            Settings::load(&paths).map_err(|e| InitializationError::Config(e.into()))?;

        let blob: Arc<dyn BlobStore> = match settings.blob.backend.as_str() {
            "azure" => Arc::new(AzureBlobStore::new(
                &settings.blob.container_url,
                &settings.blob.sas_token,
            )),
            _ => Arc::new(FsBlobStore::new(settings.blob.fs_root.clone())),
        };

        let catalog = Arc::new(CatalogService::new());
        if let Err(e) = catalog
            .refresh(blob.as_ref(), &settings.blob.vectorstore_prefix)
            .await
        {
            tracing::warn!("initial catalog build failed: {}", e);
        }

        let vectorstores = Arc::new(VectorstoreManager::new(
            blob.clone(),
            settings.blob.vectorstore_prefix.clone(),
            paths.cache_dir.clone(),
        ));

        let llm: Arc<dyn LlmProvider> = Arc::new(OpenAiCompatProvider::new(&settings.llm));

        let answer = AnswerService::new(
            catalog.clone(),
            vectorstores.clone(),
            llm.clone(),
            settings.retrieval.top_k,
            settings.citations.shift_zero_based,
        );

        Ok(Arc::new(AppState {
            paths,
            settings,
            blob,
            catalog,
            vectorstores,
            llm,
            answer,
        }))
    }
}
