use std::env;
use std::path::PathBuf;

/// Server configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory holding config.json, vocab.txt, and the ONNX graphs.
    pub models_dir: PathBuf,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PORT")
            .unwrap_or_else(|_| "5092".to_string())
            .parse::<u16>()
            .map_err(|e| format!("Invalid port number: {e}"))?;
        let models_dir = env::var("MODELS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./models"));

        Ok(ServerConfig {
            host,
            port,
            models_dir,
        })
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_formatting() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 5092,
            models_dir: PathBuf::from("./models"),
        };
        assert_eq!(config.address(), "127.0.0.1:5092");
    }
}
