mod decoder;
mod lm;
mod logger;
mod vocab;

pub use decoder::{
    DecodeError, DecodeStream, Decoder, DecoderOutput, GreedyDecoder, PrefixBeamSearch,
    PrefixBeamSearchOptions,
};
pub use lm::{LMStateRef, ZeroLM, LM};
pub use logger::{DecodeLogger, LogDecodeLogger, NullDecodeLogger};
pub use vocab::{Vocab, VocabError};
