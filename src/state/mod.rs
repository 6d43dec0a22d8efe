use std::sync::Arc;

use tokio::sync::RwLock;

use crate::core::config::{AppPaths, ConfigService, Settings};
use crate::embedding::{self, Embedder};
use crate::llm::{self, LanguageModel};
use crate::pipeline::Pipeline;
use crate::security::{init_session_token, SessionToken};
use crate::store::VectorStore;

pub mod error;

use error::InitializationError;

/// Application state shared by every route.
///
/// The embedder, the store and the language model are built exactly once
/// here and handed to the stages as `Arc`s.
#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub config: ConfigService,
    pub settings: Settings,
    pub session_token: SessionToken,
    pub store: Arc<RwLock<VectorStore>>,
    pub pipeline: Arc<Pipeline>,
}

impl AppState {
    /// Initializes the application state.
    ///
    /// This process includes:
    /// 1. Loading and validating configuration
    /// 2. Building the embedding model and opening the vector store
    /// 3. Building the language model client and wiring the pipeline
    pub async fn initialize(paths: Arc<AppPaths>) -> Result<Arc<Self>, InitializationError> {
        let config = ConfigService::new(paths.clone());
        let settings = config
            .settings()
            .map_err(|e| InitializationError::Config(e.into()))?;
        if let Ok(effective) = serde_json::to_value(&settings) {
            tracing::debug!(
                "Effective config: {}",
                config.redact_sensitive_values(&effective)
            );
        }

        let embedder = embedding::from_settings(&settings.embedding, &paths.models_dir)
            .await
            .map_err(|e| InitializationError::Embedding(e.into()))?;
        let llm = llm::from_settings(&settings.llm).map_err(|e| InitializationError::Llm(e.into()))?;
        let session_token = init_session_token(&paths.user_data_dir);

        Ok(Arc::new(Self::with_components(
            paths,
            config,
            settings,
            session_token,
            embedder,
            llm,
        )))
    }

    /// Assemble state from already-built collaborators.
    pub fn with_components(
        paths: Arc<AppPaths>,
        config: ConfigService,
        settings: Settings,
        session_token: SessionToken,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn LanguageModel>,
    ) -> Self {
        let (store, load_diagnostic) = VectorStore::open_or_create(paths.store_dir.clone(), embedder);
        if let Some(diagnostic) = &load_diagnostic {
            tracing::warn!(
                "Started with an empty vector store: {} ({})",
                diagnostic.reason,
                diagnostic.location.display()
            );
        }

        let store = Arc::new(RwLock::new(store));
        let pipeline = Arc::new(Pipeline::new(store.clone(), llm, &settings));

        AppState {
            paths,
            config,
            settings,
            session_token,
            store,
            pipeline,
        }
    }
}
