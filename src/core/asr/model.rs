//! ONNX session management for the Conformer encoder and TDT decoder.
//!
//! Two graphs make up the model:
//!
//! - **Encoder**: mel features to a subsampled acoustic embedding sequence.
//!   Input: `[batch, n_mels, frames]` plus a length vector. Output:
//!   `[batch, 1024, frames']` plus the valid output length.
//! - **Decoder/joint**: one step of the transducer. Consumes a single
//!   encoder column, the previous token, and two recurrent state tensors;
//!   produces joint logits (token logits followed by duration logits) and
//!   the updated states.
//!
//! Both sessions are built once at startup and reused across requests
//! behind mutexes. Rebuilding the decoder session per step is the naive
//! alternative and costs more than the step itself for short utterances.

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use ndarray::ArrayView2;
use ort::{
    execution_providers::CPUExecutionProvider,
    session::{
        Session, SessionInputValue, SessionInputs,
        builder::{GraphOptimizationLevel, SessionBuilder},
    },
    value::{Tensor, Value},
};
use tracing::{debug, info};

use super::error::AsrError;
use super::runtime;

/// Width of one encoder output column.
pub const ENCODER_DIM: usize = 1024;

/// Recurrent layers in the decoder state tensors.
pub const STATE_LAYERS: usize = 2;

/// Hidden width of each decoder state layer.
pub const STATE_DIM: usize = 640;

/// Flattened element count of one state tensor, shape `[2, 1, 640]`.
pub const STATE_SIZE: usize = STATE_LAYERS * STATE_DIM;

/// Duration classes appended to the token logits by the joint network.
pub const DURATION_CLASSES: usize = 5;

/// ONNX intra-op thread count per session.
const NUM_THREADS: usize = 4;

/// Encoder graph tensor names
mod encoder_schema {
    pub const AUDIO_SIGNAL: &str = "audio_signal";
    pub const LENGTH: &str = "length";
    pub const OUTPUTS: &str = "outputs";
    pub const ENCODED_LENGTHS: &str = "encoded_lengths";
}

/// Decoder/joint graph tensor names
mod decoder_schema {
    pub const ENCODER_OUTPUTS: &str = "encoder_outputs";
    pub const TARGETS: &str = "targets";
    pub const TARGET_LENGTH: &str = "target_length";
    pub const INPUT_STATES_1: &str = "input_states_1";
    pub const INPUT_STATES_2: &str = "input_states_2";
    pub const OUTPUTS: &str = "outputs";
    pub const OUTPUT_STATES_1: &str = "output_states_1";
    pub const OUTPUT_STATES_2: &str = "output_states_2";
}

/// Dense encoder output for one utterance.
///
/// Data is laid out band-major, `[1, dim, time]`: element `(d, t)` lives at
/// `d * stride + t`. The decoding loop reads one column repeatedly.
pub struct EncoderOutput {
    data: Vec<f32>,
    stride: usize,
    valid_time: usize,
}

impl EncoderOutput {
    /// Authoritative number of usable time steps, as reported by the
    /// encoder's `encoded_lengths` output (not the allocated upper bound).
    pub fn valid_time(&self) -> usize {
        self.valid_time
    }

    /// Copy the length-`ENCODER_DIM` column at time `t` into `out`.
    pub fn copy_column(&self, t: usize, out: &mut [f32]) {
        debug_assert!(t < self.stride);
        debug_assert_eq!(out.len(), ENCODER_DIM);
        for (d, slot) in out.iter_mut().enumerate() {
            *slot = self.data[d * self.stride + t];
        }
    }
}

/// One decoder/joint step result.
pub struct JointOutput {
    /// Token logits followed by `DURATION_CLASSES` duration logits.
    pub logits: Vec<f32>,
    /// Updated recurrent state, first tensor.
    pub state1: Vec<f32>,
    /// Updated recurrent state, second tensor.
    pub state2: Vec<f32>,
}

/// Loaded encoder and decoder sessions.
///
/// Sessions are protected by mutexes: the runtime requires exclusive access
/// per run, and requests may arrive concurrently.
pub struct ParakeetModel {
    encoder: Mutex<Session>,
    decoder: Mutex<Session>,
    vocab_size: usize,
}

impl ParakeetModel {
    /// Load the encoder and decoder graphs from the models directory.
    ///
    /// For each graph the int8-quantized file is preferred when present,
    /// falling back to the fp32 export.
    ///
    /// # Arguments
    /// * `models_dir` - Directory holding the `.onnx` files
    /// * `vocab_size` - Token-logit width the joint output must carry
    ///
    /// # Returns
    /// * `Result<Self, AsrError>` - Loaded model or a startup error
    pub fn load(models_dir: &Path, vocab_size: usize) -> Result<Self, AsrError> {
        runtime::ensure_initialized()?;

        let encoder_path = resolve_model_file(models_dir, "encoder-model")?;
        info!("Loading encoder from: {}", encoder_path.display());
        let encoder = create_session(&encoder_path)?;
        validate_session(
            &encoder,
            "encoder",
            &[encoder_schema::AUDIO_SIGNAL, encoder_schema::LENGTH],
            &[encoder_schema::OUTPUTS, encoder_schema::ENCODED_LENGTHS],
        )?;

        let decoder_path = resolve_model_file(models_dir, "decoder_joint-model")?;
        info!("Loading decoder from: {}", decoder_path.display());
        let decoder = create_session(&decoder_path)?;
        validate_session(
            &decoder,
            "decoder",
            &[
                decoder_schema::ENCODER_OUTPUTS,
                decoder_schema::TARGETS,
                decoder_schema::TARGET_LENGTH,
                decoder_schema::INPUT_STATES_1,
                decoder_schema::INPUT_STATES_2,
            ],
            &[
                decoder_schema::OUTPUTS,
                decoder_schema::OUTPUT_STATES_1,
                decoder_schema::OUTPUT_STATES_2,
            ],
        )?;

        info!("Model loaded (vocab_size={})", vocab_size);

        Ok(Self {
            encoder: Mutex::new(encoder),
            decoder: Mutex::new(decoder),
            vocab_size,
        })
    }

    /// Token-logit width expected from the joint output.
    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    /// Run the encoder over a full utterance of mel features.
    ///
    /// # Arguments
    /// * `features` - Feature matrix of shape `[frames, n_mels]`
    ///
    /// # Returns
    /// * `Result<EncoderOutput, AsrError>` - Acoustic embeddings plus the
    ///   valid subsampled length
    pub fn encode(&self, features: ArrayView2<'_, f32>) -> Result<EncoderOutput, AsrError> {
        let frames = features.nrows();
        let n_mels = features.ncols();
        if frames == 0 {
            return Err(AsrError::InferenceFailed(
                "no feature frames to encode".to_string(),
            ));
        }

        // Transpose frame-major [frames, n_mels] into the band-major
        // [1, n_mels, frames] layout the graph declares.
        let mut signal = vec![0.0f32; n_mels * frames];
        for t in 0..frames {
            for m in 0..n_mels {
                signal[m * frames + t] = features[[t, m]];
            }
        }

        let signal_tensor = Tensor::from_array(([1, n_mels, frames], signal)).map_err(|e| {
            AsrError::InferenceFailed(format!("failed to create audio_signal tensor: {}", e))
        })?;
        let length_tensor = Tensor::from_array(([1], vec![frames as i64])).map_err(|e| {
            AsrError::InferenceFailed(format!("failed to create length tensor: {}", e))
        })?;

        let mut encoder = self
            .encoder
            .lock()
            .map_err(|e| AsrError::InferenceFailed(format!("failed to lock encoder: {}", e)))?;

        let inputs: Vec<(Cow<'static, str>, SessionInputValue<'static>)> = vec![
            (
                Cow::Borrowed(encoder_schema::AUDIO_SIGNAL),
                SessionInputValue::Owned(Value::from(signal_tensor)),
            ),
            (
                Cow::Borrowed(encoder_schema::LENGTH),
                SessionInputValue::Owned(Value::from(length_tensor)),
            ),
        ];

        let outputs = encoder
            .run(SessionInputs::from(inputs))
            .map_err(|e| AsrError::InferenceFailed(format!("encoder run failed: {}", e)))?;

        let (shape, data) = outputs[encoder_schema::OUTPUTS]
            .try_extract_tensor::<f32>()
            .map_err(|e| {
                AsrError::InferenceFailed(format!("failed to extract encoder output: {}", e))
            })?;
        if shape.len() != 3 || shape[1] != ENCODER_DIM as i64 {
            return Err(AsrError::ShapeMismatch(format!(
                "encoder output shape {:?}, expected [1, {}, t]",
                shape, ENCODER_DIM
            )));
        }
        let stride = shape[2] as usize;

        let (_, lengths) = outputs[encoder_schema::ENCODED_LENGTHS]
            .try_extract_tensor::<i64>()
            .map_err(|e| {
                AsrError::InferenceFailed(format!("failed to extract encoded_lengths: {}", e))
            })?;
        let valid_time = (lengths.first().copied().unwrap_or(0).max(0) as usize).min(stride);

        debug!(
            "Encoder output: {} floats, valid_time={}",
            data.len(),
            valid_time
        );

        Ok(EncoderOutput {
            data: data.to_vec(),
            stride,
            valid_time,
        })
    }

    /// Run one decoder/joint step.
    ///
    /// # Arguments
    /// * `encoder_column` - One encoder column, `ENCODER_DIM` floats
    /// * `prev_token` - Last emitted non-blank token id (blank initially)
    /// * `state1`, `state2` - Current recurrent state, `STATE_SIZE` floats each
    pub fn decode_step(
        &self,
        encoder_column: &[f32],
        prev_token: i32,
        state1: &[f32],
        state2: &[f32],
    ) -> Result<JointOutput, AsrError> {
        if encoder_column.len() != ENCODER_DIM {
            return Err(AsrError::ShapeMismatch(format!(
                "encoder column has {} floats, expected {}",
                encoder_column.len(),
                ENCODER_DIM
            )));
        }
        if state1.len() != STATE_SIZE || state2.len() != STATE_SIZE {
            return Err(AsrError::ShapeMismatch(format!(
                "decoder state has {}/{} floats, expected {}",
                state1.len(),
                state2.len(),
                STATE_SIZE
            )));
        }

        let column_tensor = Tensor::from_array(([1, ENCODER_DIM, 1], encoder_column.to_vec()))
            .map_err(|e| {
                AsrError::InferenceFailed(format!("failed to create encoder_outputs tensor: {}", e))
            })?;
        let targets_tensor = Tensor::from_array(([1, 1], vec![prev_token])).map_err(|e| {
            AsrError::InferenceFailed(format!("failed to create targets tensor: {}", e))
        })?;
        let target_length_tensor = Tensor::from_array(([1], vec![1i32])).map_err(|e| {
            AsrError::InferenceFailed(format!("failed to create target_length tensor: {}", e))
        })?;
        let state1_tensor = Tensor::from_array(([STATE_LAYERS, 1, STATE_DIM], state1.to_vec()))
            .map_err(|e| {
                AsrError::InferenceFailed(format!("failed to create input_states_1 tensor: {}", e))
            })?;
        let state2_tensor = Tensor::from_array(([STATE_LAYERS, 1, STATE_DIM], state2.to_vec()))
            .map_err(|e| {
                AsrError::InferenceFailed(format!("failed to create input_states_2 tensor: {}", e))
            })?;

        let mut decoder = self
            .decoder
            .lock()
            .map_err(|e| AsrError::InferenceFailed(format!("failed to lock decoder: {}", e)))?;

        let inputs: Vec<(Cow<'static, str>, SessionInputValue<'static>)> = vec![
            (
                Cow::Borrowed(decoder_schema::ENCODER_OUTPUTS),
                SessionInputValue::Owned(Value::from(column_tensor)),
            ),
            (
                Cow::Borrowed(decoder_schema::TARGETS),
                SessionInputValue::Owned(Value::from(targets_tensor)),
            ),
            (
                Cow::Borrowed(decoder_schema::TARGET_LENGTH),
                SessionInputValue::Owned(Value::from(target_length_tensor)),
            ),
            (
                Cow::Borrowed(decoder_schema::INPUT_STATES_1),
                SessionInputValue::Owned(Value::from(state1_tensor)),
            ),
            (
                Cow::Borrowed(decoder_schema::INPUT_STATES_2),
                SessionInputValue::Owned(Value::from(state2_tensor)),
            ),
        ];

        let outputs = decoder
            .run(SessionInputs::from(inputs))
            .map_err(|e| AsrError::InferenceFailed(format!("decoder run failed: {}", e)))?;

        let (_, logits) = outputs[decoder_schema::OUTPUTS]
            .try_extract_tensor::<f32>()
            .map_err(|e| {
                AsrError::InferenceFailed(format!("failed to extract joint output: {}", e))
            })?;
        let expected = self.vocab_size + DURATION_CLASSES;
        if logits.len() != expected {
            return Err(AsrError::ShapeMismatch(format!(
                "joint output has {} logits, expected {} (vocab {} + {} durations)",
                logits.len(),
                expected,
                self.vocab_size,
                DURATION_CLASSES
            )));
        }

        let logits = logits.to_vec();

        let (_, state1) = outputs[decoder_schema::OUTPUT_STATES_1]
            .try_extract_tensor::<f32>()
            .map_err(|e| {
                AsrError::InferenceFailed(format!("failed to extract output_states_1: {}", e))
            })?;
        let (_, state2) = outputs[decoder_schema::OUTPUT_STATES_2]
            .try_extract_tensor::<f32>()
            .map_err(|e| {
                AsrError::InferenceFailed(format!("failed to extract output_states_2: {}", e))
            })?;
        if state1.len() != STATE_SIZE || state2.len() != STATE_SIZE {
            return Err(AsrError::ShapeMismatch(format!(
                "decoder output states have {}/{} floats, expected {}",
                state1.len(),
                state2.len(),
                STATE_SIZE
            )));
        }

        Ok(JointOutput {
            logits,
            state1: state1.to_vec(),
            state2: state2.to_vec(),
        })
    }
}

/// Pick the model file for `stem`, preferring the int8 quantization.
fn resolve_model_file(dir: &Path, stem: &str) -> Result<PathBuf, AsrError> {
    let int8 = dir.join(format!("{}.int8.onnx", stem));
    if int8.exists() {
        return Ok(int8);
    }
    let fp32 = dir.join(format!("{}.onnx", stem));
    if fp32.exists() {
        return Ok(fp32);
    }
    Err(AsrError::ConfigMissing(format!(
        "{}.onnx not found in {}. Download from https://huggingface.co/istupakov/parakeet-tdt-0.6b-v3-onnx",
        stem,
        dir.display()
    )))
}

fn create_session(path: &Path) -> Result<Session, AsrError> {
    let builder = SessionBuilder::new()
        .map_err(|e| AsrError::InferenceFailed(format!("failed to create session builder: {}", e)))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| AsrError::InferenceFailed(format!("failed to set optimization level: {}", e)))?
        .with_intra_threads(NUM_THREADS)
        .map_err(|e| AsrError::InferenceFailed(format!("failed to set intra threads: {}", e)))?
        .with_execution_providers([CPUExecutionProvider::default().build()])
        .map_err(|e| {
            AsrError::InferenceFailed(format!("failed to set execution providers: {}", e))
        })?;

    builder.commit_from_file(path).map_err(|e| {
        AsrError::ConfigMissing(format!(
            "failed to load ONNX model {}: {}",
            path.display(),
            e
        ))
    })
}

/// Verify the graph exposes the tensor names the pipeline binds.
fn validate_session(
    session: &Session,
    label: &str,
    required_inputs: &[&str],
    required_outputs: &[&str],
) -> Result<(), AsrError> {
    let input_names: Vec<&str> = session.inputs.iter().map(|i| i.name.as_str()).collect();
    let output_names: Vec<&str> = session.outputs.iter().map(|o| o.name.as_str()).collect();

    debug!("{} inputs: {:?}", label, input_names);
    debug!("{} outputs: {:?}", label, output_names);

    for name in required_inputs {
        if !input_names.contains(name) {
            return Err(AsrError::ShapeMismatch(format!(
                "{} graph missing input '{}'. Found: {:?}",
                label, name, input_names
            )));
        }
    }
    for name in required_outputs {
        if !output_names.contains(name) {
            return Err(AsrError::ShapeMismatch(format!(
                "{} graph missing output '{}'. Found: {:?}",
                label, name, output_names
            )));
        }
    }

    Ok(())
}
