use super::{check_input, DecodeError, Decoder, DecoderOutput};
use crate::vocab::Vocab;

/// Best-path decoding: per-frame argmax with blank and repeat collapsing.
/// A fast baseline next to the prefix beam search.
#[derive(Debug, Clone)]
pub struct GreedyDecoder {
    vocab: Vocab,
    blank: i32,
}

impl GreedyDecoder {
    pub fn new(vocab: Vocab, blank: i32) -> Result<Self, DecodeError> {
        if blank < 0 || blank as usize >= vocab.len() {
            return Err(DecodeError::InvalidBlank {
                index: blank,
                vocab: vocab.len(),
            });
        }
        Ok(Self { vocab, blank })
    }
}

impl Decoder for GreedyDecoder {
    fn decode(
        &mut self,
        data: &[f32],
        steps: usize,
        n_vocab: usize,
    ) -> Result<Vec<DecoderOutput>, DecodeError> {
        check_input(data, steps, n_vocab, &self.vocab)?;
        let mut output = DecoderOutput::default();
        let mut last = self.blank;
        for step in 0..steps {
            let row = &data[step * n_vocab..(step + 1) * n_vocab];
            let (logp, target) = find_max_index(row);
            output.score += logp;
            output.score_ctc += logp;
            let token = target as i32;
            if token != self.blank && token != last {
                output.tokens.push(token);
                output.text.push_str(&self.vocab.labels()[target]);
            }
            last = token;
        }
        Ok(vec![output])
    }
}

fn find_max_index(vs: &[f32]) -> (f32, usize) {
    let mut max_index = 0usize;
    let mut max_value = vs[0];
    for (i, &v) in vs.iter().enumerate() {
        if v > max_value {
            max_index = i;
            max_value = v;
        }
    }
    (max_value, max_index)
}
