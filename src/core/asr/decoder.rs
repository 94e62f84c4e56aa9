//! Greedy token-and-duration transducer decoding.
//!
//! The joint network emits, per step, a token distribution and a duration
//! distribution over how many encoder frames to advance. Greedy decoding
//! takes the argmax of each. A non-blank token updates the recurrent state
//! and may keep the time pointer in place (duration 0), which is how the
//! model emits several tokens for one encoder frame; blank or an emission
//! cap forces the pointer forward so the loop always terminates.

use tracing::trace;

use super::error::AsrError;
use super::model::{ENCODER_DIM, EncoderOutput, ParakeetModel, STATE_SIZE};

/// Cap on non-blank emissions at a single time step before the pointer is
/// forced forward.
pub const MAX_TOKENS_PER_STEP: usize = 10;

/// Index of the largest value, ties broken by lowest index.
fn argmax(values: &[f32]) -> usize {
    let mut best = 0;
    let mut best_value = f32::NEG_INFINITY;
    for (i, &v) in values.iter().enumerate() {
        if v > best_value {
            best_value = v;
            best = i;
        }
    }
    best
}

/// The transducer's emission and time-advancement bookkeeping, separated
/// from tensor plumbing so the policy can be exercised directly.
#[derive(Debug)]
pub struct DecodeState {
    blank_id: usize,
    time: usize,
    emitted_at_step: usize,
    prev_token: usize,
    tokens: Vec<usize>,
}

impl DecodeState {
    pub fn new(blank_id: usize) -> Self {
        Self {
            blank_id,
            time: 0,
            emitted_at_step: 0,
            prev_token: blank_id,
            tokens: Vec::new(),
        }
    }

    /// Current encoder time pointer.
    pub fn time(&self) -> usize {
        self.time
    }

    /// Last emitted non-blank token, or blank before the first emission.
    pub fn prev_token(&self) -> usize {
        self.prev_token
    }

    /// Apply one joint decision. Returns true when a token was emitted, in
    /// which case the caller must adopt the updated recurrent state.
    ///
    /// Advancement rules:
    /// - predicted duration > 0 moves the pointer by that many frames;
    /// - duration 0 with a blank, or with `MAX_TOKENS_PER_STEP` emissions
    ///   already at this frame, moves the pointer by one;
    /// - otherwise the pointer stays and the next step re-reads the same
    ///   encoder column.
    pub fn apply(&mut self, token: usize, duration: usize) -> bool {
        let emitted = token != self.blank_id;
        if emitted {
            self.tokens.push(token);
            self.prev_token = token;
            self.emitted_at_step += 1;
        }

        if duration > 0 {
            self.time += duration;
            self.emitted_at_step = 0;
        } else if !emitted || self.emitted_at_step >= MAX_TOKENS_PER_STEP {
            self.time += 1;
            self.emitted_at_step = 0;
        }

        emitted
    }

    pub fn into_tokens(self) -> Vec<usize> {
        self.tokens
    }
}

/// Run the greedy TDT loop over the full encoder output.
///
/// # Arguments
/// * `model` - Loaded sessions; only the decoder session is run here
/// * `encoded` - Encoder output for the utterance
/// * `blank_id` - Non-emitting token id
///
/// # Returns
/// * `Result<Vec<usize>, AsrError>` - Emitted token ids in order
pub fn greedy_decode(
    model: &ParakeetModel,
    encoded: &EncoderOutput,
    blank_id: usize,
) -> Result<Vec<usize>, AsrError> {
    let vocab_size = model.vocab_size();
    let mut state = DecodeState::new(blank_id);
    let mut state1 = vec![0.0f32; STATE_SIZE];
    let mut state2 = vec![0.0f32; STATE_SIZE];
    let mut column = vec![0.0f32; ENCODER_DIM];

    while state.time() < encoded.valid_time() {
        encoded.copy_column(state.time(), &mut column);

        let output = model.decode_step(&column, state.prev_token() as i32, &state1, &state2)?;

        let (token_logits, duration_logits) = output.logits.split_at(vocab_size);
        let token = argmax(token_logits);
        let duration = argmax(duration_logits);

        trace!(
            t = state.time(),
            token,
            duration,
            "decoder step"
        );

        if state.apply(token, duration) {
            state1 = output.state1;
            state2 = output.state2;
        }
    }

    Ok(state.into_tokens())
}
