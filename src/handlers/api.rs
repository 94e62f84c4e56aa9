use axum::Json;
use serde::{Deserialize, Serialize};

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Server status
    pub status: String,
}

/// Health check handler
/// Returns a simple JSON response indicating the server is running
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Information about an available model, in the OpenAI list shape
#[derive(Debug, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub owned_by: String,
}

/// The list of available models
#[derive(Debug, Serialize, Deserialize)]
pub struct ModelsResponse {
    pub object: String,
    pub data: Vec<ModelInfo>,
}

/// List the models this server exposes.
///
/// `whisper-1` is an alias kept so off-the-shelf OpenAI clients work
/// without configuration changes.
pub async fn list_models() -> Json<ModelsResponse> {
    Json(ModelsResponse {
        object: "list".to_string(),
        data: vec![
            ModelInfo {
                id: "parakeet-tdt-0.6b".to_string(),
                object: "model".to_string(),
                created: 1_700_000_000,
                owned_by: "nvidia".to_string(),
            },
            ModelInfo {
                id: "whisper-1".to_string(),
                object: "model".to_string(),
                created: 1_700_000_000,
                owned_by: "nvidia".to_string(),
            },
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_response() {
        let Json(response) = health_check().await;
        assert_eq!(response.status, "ok");
    }

    #[tokio::test]
    async fn test_models_list_shape() {
        let Json(response) = list_models().await;
        assert_eq!(response.object, "list");
        assert_eq!(response.data.len(), 2);
        assert_eq!(response.data[0].id, "parakeet-tdt-0.6b");
        assert_eq!(response.data[1].id, "whisper-1");

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["data"][0]["owned_by"], "nvidia");
    }
}
