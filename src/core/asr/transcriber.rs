//! End-to-end transcription pipeline.
//!
//! `Transcriber` owns everything a request needs: the model configuration,
//! the vocabulary, the mel frontend, and the ONNX sessions. One call to
//! [`Transcriber::transcribe`] takes an audio payload from bytes to text:
//! decode PCM, resample to 16 kHz, extract features, run the encoder once,
//! then step the TDT decoder and detokenize.

use std::path::Path;

use tracing::{debug, info};

use super::config::ModelConfig;
use super::decoder::greedy_decode;
use super::error::AsrError;
use super::mel::MelFilterbank;
use super::model::ParakeetModel;
use super::resample::{TARGET_SAMPLE_RATE, resample};
use super::vocab::Vocabulary;
use super::wav::{WavAudio, decode_wav};

/// Minimum usable utterance length after resampling (100ms at 16 kHz).
/// Shorter clips transcribe to the empty string rather than an error, so
/// trigger-happy clients sending near-empty buffers stay harmless.
pub const MIN_SAMPLES: usize = 1600;

/// Route a payload to the right container decoder based on its extension
/// hint. Compressed formats are rejected here; unknown extensions are tried
/// as WAV.
pub fn decode_audio(data: &[u8], extension: &str) -> Result<WavAudio, AsrError> {
    match extension {
        ".wav" => decode_wav(data),
        ".webm" | ".ogg" | ".mp3" | ".m4a" => Err(AsrError::UnsupportedEncoding(format!(
            "format {} requires external transcoding to WAV",
            extension
        ))),
        _ => decode_wav(data),
    }
}

/// Loaded speech recognizer.
///
/// Thread-safe: sessions are internally locked, everything else is
/// read-only after load. Wrap in an `Arc` and share across requests.
pub struct Transcriber {
    config: ModelConfig,
    vocab: Vocabulary,
    mel: MelFilterbank,
    model: ParakeetModel,
}

impl Transcriber {
    /// Load all model assets from a directory.
    ///
    /// The directory must contain `config.json`, `vocab.txt`, and the
    /// encoder / decoder_joint ONNX graphs.
    ///
    /// # Arguments
    /// * `models_dir` - Directory with the model assets
    ///
    /// # Returns
    /// * `Result<Self, AsrError>` - Ready transcriber or a startup error
    pub fn load(models_dir: &Path) -> Result<Self, AsrError> {
        let config = ModelConfig::load(&models_dir.join("config.json"))?;
        let vocab = Vocabulary::load(&models_dir.join("vocab.txt"))?;
        let mel = MelFilterbank::new(config.features_size, TARGET_SAMPLE_RATE);
        let model = ParakeetModel::load(models_dir, vocab.len())?;

        info!(
            "Transcriber ready: {} mel bands, vocab {} tokens, blank_id={}",
            config.features_size,
            vocab.len(),
            vocab.blank_id()
        );

        Ok(Self {
            config,
            vocab,
            mel,
            model,
        })
    }

    /// Transcribe an audio payload to text.
    ///
    /// # Arguments
    /// * `data` - Raw container bytes
    /// * `extension` - Lowercased filename extension including the dot,
    ///   used as the container hint
    ///
    /// # Returns
    /// * `Result<String, AsrError>` - Transcription, possibly empty
    pub fn transcribe(&self, data: &[u8], extension: &str) -> Result<String, AsrError> {
        let audio = decode_audio(data, extension)?;
        let samples = resample(audio.samples, audio.sample_rate, TARGET_SAMPLE_RATE);

        debug!(
            "Waveform: {} samples ({:.2} seconds)",
            samples.len(),
            samples.len() as f64 / TARGET_SAMPLE_RATE as f64
        );

        if samples.len() < MIN_SAMPLES {
            debug!("Audio too short: {} samples, returning empty text", samples.len());
            return Ok(String::new());
        }

        let features = self.mel.extract(&samples)?;
        if features.nrows() == 0 {
            return Err(AsrError::InferenceFailed("no features extracted".to_string()));
        }
        debug!(
            "Mel features: {} frames x {} bands",
            features.nrows(),
            features.ncols()
        );

        let encoded = self.model.encode(features.view())?;
        debug!(
            "Encoder time steps: {} (estimated {})",
            encoded.valid_time(),
            (features.nrows() - 1) / self.config.subsampling_factor + 1
        );

        let tokens = greedy_decode(&self.model, &encoded, self.vocab.blank_id())?;
        debug!("Decoded {} tokens", tokens.len());

        Ok(self.vocab.decode(&tokens))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_audio_rejects_compressed_formats() {
        for ext in [".webm", ".ogg", ".mp3", ".m4a"] {
            let result = decode_audio(&[0u8; 64], ext);
            assert!(
                matches!(result, Err(AsrError::UnsupportedEncoding(_))),
                "extension {} was not rejected",
                ext
            );
        }
    }

    #[test]
    fn test_decode_audio_unknown_extension_tries_wav() {
        // Garbage bytes under an unknown extension fail as a bad RIFF
        // container, proving the WAV path was attempted.
        let result = decode_audio(&[0u8; 64], ".raw");
        assert!(matches!(result, Err(AsrError::MalformedContainer(_))));
    }

    #[test]
    fn test_min_samples_is_100ms() {
        assert_eq!(MIN_SAMPLES, TARGET_SAMPLE_RATE as usize / 10);
    }
}
