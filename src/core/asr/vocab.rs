//! SentencePiece-style vocabulary and detokenization.
//!
//! The vocab file carries one `<piece> <id>` entry per line. Pieces that
//! begin with U+2581 (the SentencePiece word-boundary marker) are stored
//! with the marker rewritten to an ASCII space, so concatenating decoded
//! pieces reproduces word boundaries directly. Pieces of the form `<NAME>`
//! are control tokens and never appear in output text.

use std::collections::HashMap;
use std::io::{BufRead, BufReader};
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use super::error::AsrError;

/// SentencePiece word-boundary marker (lower one eighth block).
const WORD_BOUNDARY: char = '\u{2581}';

/// Blank token id used when the vocab does not carry a `<blk>` piece.
const FALLBACK_BLANK_ID: usize = 8192;

static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}").expect("valid regex"));

/// Token-id-to-piece mapping with a distinguished blank id.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    pieces: HashMap<usize, String>,
    blank_id: usize,
}

impl Vocabulary {
    /// Load the vocabulary from a `vocab.txt` file.
    pub fn load(path: &Path) -> Result<Self, AsrError> {
        let file = std::fs::File::open(path).map_err(|e| {
            AsrError::ConfigMissing(format!("failed to read {}: {}", path.display(), e))
        })?;
        let vocab = Self::from_reader(BufReader::new(file))?;
        debug!(
            "Vocab loaded: {} tokens, blank_id={}",
            vocab.len(),
            vocab.blank_id
        );
        Ok(vocab)
    }

    /// Parse vocabulary entries from any line-oriented reader.
    ///
    /// Each well-formed line contributes exactly one entry. Malformed lines
    /// and duplicate ids are skipped. The blank id is taken from the `<blk>`
    /// piece when present, falling back to the conventional constant.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, AsrError> {
        let mut pieces = HashMap::new();
        let mut blank_id = FALLBACK_BLANK_ID;

        for line in reader.lines() {
            let line = line.map_err(|e| {
                AsrError::ConfigMissing(format!("failed to read vocab line: {}", e))
            })?;
            let Some((piece, id)) = line.split_once(' ') else {
                continue;
            };
            let Ok(id) = id.parse::<usize>() else {
                continue;
            };
            if pieces.contains_key(&id) {
                continue;
            }
            if piece == "<blk>" {
                blank_id = id;
            }
            pieces.insert(id, piece.replace(WORD_BOUNDARY, " "));
        }

        Ok(Self { pieces, blank_id })
    }

    /// Number of entries, which is also the token-logit width the decoder
    /// graph produces for this vocabulary.
    pub fn len(&self) -> usize {
        self.pieces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    /// The non-emitting blank token id.
    pub fn blank_id(&self) -> usize {
        self.blank_id
    }

    /// Look up the stored piece for a token id.
    pub fn piece(&self, id: usize) -> Option<&str> {
        self.pieces.get(&id).map(String::as_str)
    }

    /// Render a token sequence as text.
    ///
    /// Control tokens (`<...>`) are dropped, pieces are concatenated, runs
    /// of whitespace are collapsed to a single space, and the result is
    /// trimmed.
    pub fn decode(&self, tokens: &[usize]) -> String {
        let mut text = String::new();
        for &id in tokens {
            let Some(piece) = self.piece(id) else {
                continue;
            };
            if piece.starts_with('<') && piece.ends_with('>') {
                continue;
            }
            text.push_str(piece);
        }

        let text = MULTI_SPACE.replace_all(&text, " ");
        text.trim().to_string()
    }
}
