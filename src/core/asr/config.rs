//! Model configuration loaded from `config.json` in the models directory.

use std::path::Path;

use serde::Deserialize;

use super::error::AsrError;

/// Default number of mel features expected by the encoder.
pub const DEFAULT_FEATURES_SIZE: usize = 128;

/// Default encoder subsampling factor (input frames per output frame).
pub const DEFAULT_SUBSAMPLING_FACTOR: usize = 8;

/// Inference hyperparameters read once at startup.
///
/// Missing or zero-valued fields fall back to the defaults above.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Model family identifier. Carried for diagnostics, not consulted.
    #[serde(default)]
    pub model_type: String,
    /// Number of mel bands the encoder consumes.
    #[serde(default)]
    pub features_size: usize,
    /// Ratio of encoder input frames to encoder output frames.
    #[serde(default)]
    pub subsampling_factor: usize,
}

impl ModelConfig {
    /// Load the configuration from a `config.json` file.
    ///
    /// # Arguments
    /// * `path` - Path to the config file
    ///
    /// # Returns
    /// * `Result<Self, AsrError>` - Parsed config with defaults applied
    pub fn load(path: &Path) -> Result<Self, AsrError> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            AsrError::ConfigMissing(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&data).map_err(|e| {
            AsrError::ConfigMissing(format!("failed to parse {}: {}", path.display(), e))
        })?;
        Ok(config.normalized())
    }

    /// Replace zero-valued fields with their defaults.
    fn normalized(mut self) -> Self {
        if self.features_size == 0 {
            self.features_size = DEFAULT_FEATURES_SIZE;
        }
        if self.subsampling_factor == 0 {
            self.subsampling_factor = DEFAULT_SUBSAMPLING_FACTOR;
        }
        self
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_type: String::new(),
            features_size: DEFAULT_FEATURES_SIZE,
            subsampling_factor: DEFAULT_SUBSAMPLING_FACTOR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_applied_for_missing_fields() {
        let config: ModelConfig = serde_json::from_str("{}").unwrap();
        let config = config.normalized();
        assert_eq!(config.features_size, DEFAULT_FEATURES_SIZE);
        assert_eq!(config.subsampling_factor, DEFAULT_SUBSAMPLING_FACTOR);
        assert!(config.model_type.is_empty());
    }

    #[test]
    fn test_zero_values_treated_as_unset() {
        let config: ModelConfig =
            serde_json::from_str(r#"{"features_size": 0, "subsampling_factor": 0}"#).unwrap();
        let config = config.normalized();
        assert_eq!(config.features_size, DEFAULT_FEATURES_SIZE);
        assert_eq!(config.subsampling_factor, DEFAULT_SUBSAMPLING_FACTOR);
    }

    #[test]
    fn test_explicit_values_preserved() {
        let config: ModelConfig = serde_json::from_str(
            r#"{"model_type": "tdt", "features_size": 80, "subsampling_factor": 4}"#,
        )
        .unwrap();
        let config = config.normalized();
        assert_eq!(config.model_type, "tdt");
        assert_eq!(config.features_size, 80);
        assert_eq!(config.subsampling_factor, 4);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"model_type": "tdt", "features_size": 128}}"#).unwrap();

        let config = ModelConfig::load(file.path()).unwrap();
        assert_eq!(config.model_type, "tdt");
        assert_eq!(config.features_size, 128);
        assert_eq!(config.subsampling_factor, DEFAULT_SUBSAMPLING_FACTOR);
    }

    #[test]
    fn test_load_missing_file() {
        let result = ModelConfig::load(Path::new("/nonexistent/config.json"));
        assert!(matches!(result, Err(AsrError::ConfigMissing(_))));
    }
}
