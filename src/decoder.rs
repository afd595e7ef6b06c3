mod greedy;
mod prefix;

pub use greedy::GreedyDecoder;
pub use prefix::{DecodeStream, PrefixBeamSearch, PrefixBeamSearchOptions};

use thiserror::Error;

use crate::vocab::Vocab;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("empty log-probability matrix")]
    EmptyInput,
    #[error("matrix width {width} does not match vocabulary size {vocab}")]
    VocabMismatch { width: usize, vocab: usize },
    #[error("matrix of length {len} cannot hold {steps} frames of width {width}")]
    ShapeMismatch { len: usize, steps: usize, width: usize },
    #[error("non-finite probability at frame {frame}, label {label}")]
    NonFinite { frame: usize, label: usize },
    #[error("blank index {index} is out of range for a vocabulary of {vocab} labels")]
    InvalidBlank { index: i32, vocab: usize },
    #[error("beam width must be positive")]
    InvalidBeamWidth,
}

/// One ranked decoding hypothesis.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DecoderOutput {
    /// Total ranking score of this hypothesis.
    pub score: f32,
    /// Acoustic contribution to `score`.
    pub score_ctc: f32,
    /// Language-model contribution to `score`.
    pub score_lm: f32,
    /// The emitted label indices. Never contains the blank label.
    pub tokens: Vec<i32>,
    /// Text reconstructed from the emitted labels.
    pub text: String,
}

/// Decoder is a trait for decoding a ctc sequence of tokens.
pub trait Decoder {
    /// Decodes `steps` frames of `n_vocab` log-probabilities laid out
    /// time-major in `data`, returning hypotheses ranked best-first.
    fn decode(
        &mut self,
        data: &[f32],
        steps: usize,
        n_vocab: usize,
    ) -> Result<Vec<DecoderOutput>, DecodeError>;
}

/// Validates one matrix (or chunk) before any beam state is touched.
pub(crate) fn check_input(
    data: &[f32],
    steps: usize,
    n_vocab: usize,
    vocab: &Vocab,
) -> Result<(), DecodeError> {
    if steps == 0 {
        return Err(DecodeError::EmptyInput);
    }
    if n_vocab != vocab.len() {
        return Err(DecodeError::VocabMismatch {
            width: n_vocab,
            vocab: vocab.len(),
        });
    }
    if data.len() != steps * n_vocab {
        return Err(DecodeError::ShapeMismatch {
            len: data.len(),
            steps,
            width: n_vocab,
        });
    }
    for (i, &p) in data.iter().enumerate() {
        // log(0) = -inf is a legal entry; NaN and +inf are not probabilities.
        if p.is_nan() || p == f32::INFINITY {
            return Err(DecodeError::NonFinite {
                frame: i / n_vocab,
                label: i % n_vocab,
            });
        }
    }
    Ok(())
}
