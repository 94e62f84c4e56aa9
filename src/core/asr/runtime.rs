//! ONNX Runtime environment lifecycle.
//!
//! The runtime has a single process-wide environment that must be
//! initialized before any session is built. `ensure_initialized` performs
//! that init exactly once, resolving the native library from the
//! `ONNXRUNTIME_LIB` environment variable first and a fixed list of
//! well-known locations second. The environment lives for the remainder of
//! the process; `ort` tears it down at exit.

use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing::info;

use super::error::AsrError;

/// Environment variable naming the onnxruntime shared library.
pub const RUNTIME_LIB_ENV: &str = "ONNXRUNTIME_LIB";

/// Locations probed when `ONNXRUNTIME_LIB` is unset.
const WELL_KNOWN_PATHS: &[&str] = &[
    "/usr/lib/libonnxruntime.so",
    "/usr/lib/x86_64-linux-gnu/libonnxruntime.so",
    "/usr/local/lib/libonnxruntime.so",
    "/opt/onnxruntime/lib/libonnxruntime.so",
    "./libonnxruntime.so",
];

static ORT_ENV: OnceCell<()> = OnceCell::new();

/// Initialize the ONNX Runtime environment, at most once per process.
///
/// Subsequent calls are no-ops returning the first call's success. A failed
/// first attempt is not retried; startup treats it as fatal.
pub fn ensure_initialized() -> Result<(), AsrError> {
    ORT_ENV
        .get_or_try_init(|| {
            let lib_path = resolve_library_path().ok_or_else(|| {
                AsrError::RuntimeUnavailable(format!(
                    "onnxruntime library not found. Set {} or install libonnxruntime",
                    RUNTIME_LIB_ENV
                ))
            })?;

            info!(
                "Initializing ONNX Runtime from {}",
                lib_path.display()
            );
            ort::init_from(lib_path.to_string_lossy())
                .commit()
                .map_err(|e| {
                    AsrError::RuntimeUnavailable(format!(
                        "failed to initialize ONNX Runtime from {}: {}",
                        lib_path.display(),
                        e
                    ))
                })?;
            Ok(())
        })
        .map(|_| ())
}

/// Resolve the native library path from the environment or the probe list.
pub fn resolve_library_path() -> Option<PathBuf> {
    resolve_from(std::env::var(RUNTIME_LIB_ENV).ok().as_deref())
}

fn resolve_from(env_value: Option<&str>) -> Option<PathBuf> {
    if let Some(path) = env_value {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    WELL_KNOWN_PATHS
        .iter()
        .map(Path::new)
        .find(|p| p.exists())
        .map(Path::to_path_buf)
}
