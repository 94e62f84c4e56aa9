use std::sync::Arc;

use crate::config::ServerConfig;
use crate::core::asr::{AsrError, Transcriber};

/// Application state that can be shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    /// Loaded recognizer, shared by every transcription request
    pub transcriber: Arc<Transcriber>,
}

impl AppState {
    /// Build the state, loading model assets off the async runtime.
    pub async fn new(config: ServerConfig) -> Result<Arc<Self>, AsrError> {
        let models_dir = config.models_dir.clone();
        let transcriber = tokio::task::spawn_blocking(move || Transcriber::load(&models_dir))
            .await
            .map_err(|e| {
                AsrError::ConfigMissing(format!("failed to spawn model load task: {}", e))
            })??;

        Ok(Arc::new(Self {
            config,
            transcriber: Arc::new(transcriber),
        }))
    }
}
