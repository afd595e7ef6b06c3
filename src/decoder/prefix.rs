use std::cmp::Ordering;

use ordered_float::OrderedFloat;
use rustc_hash::{FxHashMap, FxHashSet};

use super::{check_input, DecodeError, Decoder, DecoderOutput};
use crate::lm::{LMStateRef, LM};
use crate::logger::{DecodeLogger, NullDecodeLogger};
use crate::vocab::Vocab;

/// An emitted label sequence, the key identifying one hypothesis.
type Prefix = Vec<i32>;

/// Numerically stable log(exp(a) + exp(b)).
/// Negative infinity is the additive identity: combining with it returns
/// the other operand unchanged.
pub(crate) fn log_add(a: f32, b: f32) -> f32 {
    if a == f32::NEG_INFINITY {
        return b;
    }
    if b == f32::NEG_INFINITY {
        return a;
    }
    let (hi, lo) = if a < b { (b, a) } else { (a, b) };
    hi + libm::log1p(libm::exp((lo - hi) as f64)) as f32
}

/// One hypothesis: the mass of all frame paths collapsing to one prefix,
/// split by whether the latest path symbol was a blank. The `n_`-prefixed
/// fields buffer the frame currently being expanded; `advance_frame` folds
/// them in once the frame is complete, so expansions never read a value
/// another expansion already touched.
#[derive(Clone, Debug)]
struct Beam {
    /// Scored words so far, separator-joined.
    text: String,
    /// Most recently completed word.
    next_word: String,
    /// Word in progress since the last separator.
    partial_word: String,
    /// Index of the most recent non-blank emission.
    last_token: Option<i32>,
    /// Scorer state after the words in `text`.
    lm_state: LMStateRef,
    /// Highest single-path log-probability that has reached this prefix.
    p_max: f32,
    /// Mass of paths ending in a blank, at the settled frame.
    p_b: f32,
    /// Mass of paths ending in the prefix's last label, at the settled frame.
    p_nb: f32,
    n_p_b: f32,
    n_p_nb: f32,
    score_ctc: f32,
    score_lm: f32,
    score: f32,
}

impl Beam {
    fn root(lm_state: LMStateRef) -> Self {
        Self {
            text: String::new(),
            next_word: String::new(),
            partial_word: String::new(),
            last_token: None,
            lm_state,
            p_max: 0.0,
            p_b: 0.0,
            p_nb: f32::NEG_INFINITY,
            n_p_b: f32::NEG_INFINITY,
            n_p_nb: f32::NEG_INFINITY,
            score_ctc: 0.0,
            score_lm: 0.0,
            score: 0.0,
        }
    }

    fn seeded(p_max: f32) -> Self {
        Self {
            text: String::new(),
            next_word: String::new(),
            partial_word: String::new(),
            last_token: None,
            lm_state: LMStateRef::new(),
            p_max,
            p_b: f32::NEG_INFINITY,
            p_nb: f32::NEG_INFINITY,
            n_p_b: f32::NEG_INFINITY,
            n_p_nb: f32::NEG_INFINITY,
            score_ctc: f32::NEG_INFINITY,
            score_lm: 0.0,
            score: f32::NEG_INFINITY,
        }
    }

    /// Settles the next-frame accumulators. Must run exactly once per
    /// processed frame, after every expansion for that frame.
    fn advance_frame(&mut self) {
        self.p_b = self.n_p_b;
        self.p_nb = self.n_p_nb;
        self.n_p_b = f32::NEG_INFINITY;
        self.n_p_nb = f32::NEG_INFINITY;
        self.score_ctc = log_add(self.p_b, self.p_nb);
        self.score = self.score_ctc + self.score_lm;
    }
}

/// Ranking order shared by pruning and output: descending score, ties
/// broken by ascending prefix so results do not depend on map iteration.
fn rank_order(a_prefix: &[i32], a: &Beam, b_prefix: &[i32], b: &Beam) -> Ordering {
    OrderedFloat(b.score)
        .cmp(&OrderedFloat(a.score))
        .then_with(|| a_prefix.cmp(b_prefix))
}

/// All live hypotheses of one decode, keyed by prefix. Exactly one root
/// entry (the empty prefix) exists before the first frame.
struct BeamSet {
    beams: FxHashMap<Prefix, Beam>,
}

impl BeamSet {
    fn new(root_lm_state: LMStateRef) -> Self {
        let mut beams = FxHashMap::default();
        beams.insert(Prefix::new(), Beam::root(root_lm_state));
        Self { beams }
    }

    fn len(&self) -> usize {
        self.beams.len()
    }

    fn get_mut(&mut self, prefix: &[i32]) -> Option<&mut Beam> {
        self.beams.get_mut(prefix)
    }

    fn values_mut(&mut self) -> impl Iterator<Item = &mut Beam> {
        self.beams.values_mut()
    }

    /// Looks up `prefix`, seeding a fresh beam on first sight. Expansion
    /// paths landing on an already-known prefix merge into its beam; the
    /// recorded `p_max` keeps the best single-path probability seen so far.
    fn get_or_create(&mut self, prefix: Prefix, candidate_logp: f32) -> (&mut Beam, bool) {
        use std::collections::hash_map::Entry;
        match self.beams.entry(prefix) {
            Entry::Occupied(entry) => {
                let beam = entry.into_mut();
                if candidate_logp > beam.p_max {
                    beam.p_max = candidate_logp;
                }
                (beam, false)
            }
            Entry::Vacant(entry) => (entry.insert(Beam::seeded(candidate_logp)), true),
        }
    }

    fn advance_all(&mut self) {
        for beam in self.beams.values_mut() {
            beam.advance_frame();
        }
    }

    /// Retains the `k` best beams. Partial selection, not a full sort;
    /// `rank_order` makes the retained set reproducible.
    fn prune_to_top_k(&mut self, k: usize) {
        if self.beams.len() <= k {
            return;
        }
        let mut entries: Vec<(Prefix, Beam)> = self.beams.drain().collect();
        pdqselect::select_by(&mut entries, k, |a, b| rank_order(&a.0, &a.1, &b.0, &b.1));
        entries.truncate(k);
        self.beams = entries.into_iter().collect();
    }

    /// Beams sorted best-first. Full sort, used where output order matters.
    fn ranked(&self) -> Vec<(&Prefix, &Beam)> {
        let mut entries: Vec<_> = self.beams.iter().collect();
        entries.sort_by(|a, b| rank_order(a.0, a.1, b.0, b.1));
        entries
    }

    /// Collapses beams that share recent word history, keeping the best
    /// scorer of each group.
    fn prune_history(&mut self) {
        let mut seen = FxHashSet::default();
        let mut stale = Vec::new();
        for (prefix, beam) in self.ranked() {
            let signature = (
                beam.next_word.clone(),
                beam.partial_word.clone(),
                beam.last_token,
            );
            if !seen.insert(signature) {
                stale.push(prefix.clone());
            }
        }
        for prefix in stale {
            self.beams.remove(&prefix);
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PrefixBeamSearchOptions {
    /// Max beams retained after each frame.
    pub beam_width: usize,
    /// Labels this far below the frame maximum are not expanded.
    pub beam_prune_logp: f32,
    /// Absolute floor below which a label is never considered.
    pub token_prune_min_logp: f32,
    /// Collapse beams sharing recent word history after width pruning.
    pub history_prune: bool,
    /// Number of final hypotheses returned.
    pub topk: usize,
    /// Weight applied to language-model increments entering `score_lm`.
    pub lm_weight: f32,
}

impl Default for PrefixBeamSearchOptions {
    fn default() -> Self {
        Self {
            beam_width: 100,
            beam_prune_logp: -10.0,
            token_prune_min_logp: -5.0,
            history_prune: true,
            topk: 1,
            lm_weight: 0.5,
        }
    }
}

/// Retained search state of one utterance. Created by
/// [`PrefixBeamSearch::begin`], advanced chunk by chunk, consumed by
/// [`PrefixBeamSearch::finish`]. The stream is the only state crossing
/// chunk calls; its internals are not reachable from the caller.
pub struct DecodeStream {
    beams: BeamSet,
    processed_frames: usize,
}

impl DecodeStream {
    /// Frames consumed so far.
    pub fn processed_frames(&self) -> usize {
        self.processed_frames
    }
}

pub struct PrefixBeamSearch<T: LM> {
    options: PrefixBeamSearchOptions,
    vocab: Vocab,
    blank: i32,
    /// Index of the word-separator label, when the vocabulary has one.
    space: Option<i32>,
    lm: T,
    logger: Box<dyn DecodeLogger>,
}

impl<T: LM> PrefixBeamSearch<T> {
    /// Configuration problems (bad blank index, zero width) are reported
    /// here, before any frame is processed.
    pub fn new(
        options: PrefixBeamSearchOptions,
        vocab: Vocab,
        blank: i32,
        lm: T,
    ) -> Result<Self, DecodeError> {
        if options.beam_width == 0 {
            return Err(DecodeError::InvalidBeamWidth);
        }
        if blank < 0 || blank as usize >= vocab.len() {
            return Err(DecodeError::InvalidBlank {
                index: blank,
                vocab: vocab.len(),
            });
        }
        let space = vocab.index(" ").ok();
        Ok(Self {
            options,
            vocab,
            blank,
            space,
            lm,
            logger: Box::new(NullDecodeLogger),
        })
    }

    /// Replaces the decode observer. [`NullDecodeLogger`] by default.
    pub fn with_logger(mut self, logger: Box<dyn DecodeLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Opens a fresh search over an utterance.
    pub fn begin(&mut self) -> DecodeStream {
        DecodeStream {
            beams: BeamSet::new(self.lm.start()),
            processed_frames: 0,
        }
    }

    /// Consumes `steps` additional frames and reports the current top-K.
    /// The returned hypotheses are a snapshot: a trailing partial word
    /// shows up in their text but has not been through the scorer yet.
    pub fn decode_chunk(
        &mut self,
        stream: &mut DecodeStream,
        data: &[f32],
        steps: usize,
        n_vocab: usize,
    ) -> Result<Vec<DecoderOutput>, DecodeError> {
        check_input(data, steps, n_vocab, &self.vocab)?;
        for t in 0..steps {
            let frame = stream.processed_frames + t;
            let row = &data[t * n_vocab..(t + 1) * n_vocab];
            self.expand_frame(stream, row);
            stream.beams.advance_all();
            let before = stream.beams.len();
            stream.beams.prune_to_top_k(self.options.beam_width);
            if self.options.history_prune {
                stream.beams.prune_history();
            }
            let after = stream.beams.len();
            if after < before {
                self.logger.pruned(frame, before, after);
            }
            self.logger.frame(frame, after);
        }
        stream.processed_frames += steps;
        Ok(self.hypotheses(stream))
    }

    /// Scores the trailing partial word, applies the scorer's end-of-
    /// sequence increment, and returns the final ranking.
    pub fn finish(&mut self, mut stream: DecodeStream) -> Vec<DecoderOutput> {
        for beam in stream.beams.values_mut() {
            if !beam.partial_word.is_empty() {
                let word = std::mem::take(&mut beam.partial_word);
                push_word(&mut beam.text, &word);
                let (state, increment) = self.lm.score(&beam.lm_state, &word);
                beam.lm_state = state;
                beam.score_lm += self.options.lm_weight * increment;
                beam.next_word = word;
            }
            let (state, increment) = self.lm.finish(&beam.lm_state);
            beam.lm_state = state;
            beam.score_lm += self.options.lm_weight * increment;
            beam.score = beam.score_ctc + beam.score_lm;
        }
        let outputs = self.hypotheses(&stream);
        self.logger.summary();
        outputs
    }

    fn expand_frame(&mut self, stream: &mut DecodeStream, row: &[f32]) {
        // Candidate labels: the frame argmax plus every label above the
        // absolute floor that also clears the frame-relative cutoff.
        let mut max_index = 0usize;
        for (i, &p) in row.iter().enumerate() {
            if p > row[max_index] {
                max_index = i;
            }
        }
        let max_logp = row[max_index];
        let candidates: Vec<usize> = row
            .iter()
            .enumerate()
            .filter(|&(i, &p)| {
                i == max_index
                    || (p > self.options.token_prune_min_logp
                        && p >= max_logp + self.options.beam_prune_logp)
            })
            .map(|(i, _)| i)
            .collect();

        // Expansions read only the previous frame's settled state; within a
        // frame every (beam, label) pair sees this same frozen snapshot.
        let snapshot: Vec<(Prefix, Beam)> = stream
            .beams
            .ranked()
            .into_iter()
            .map(|(prefix, beam)| (prefix.clone(), beam.clone()))
            .collect();

        for (prefix, prev) in &snapshot {
            for &target in &candidates {
                let token = target as i32;
                let p_token = row[target];
                if token == self.blank {
                    // A blank never changes the prefix.
                    if let Some(beam) = stream.beams.get_mut(prefix) {
                        beam.n_p_b = log_add(beam.n_p_b, prev.score_ctc + p_token);
                    }
                } else if prev.last_token == Some(token) {
                    // Repeats without an intervening blank collapse onto the
                    // same prefix; the path through a blank opens a new one.
                    if let Some(beam) = stream.beams.get_mut(prefix) {
                        beam.n_p_nb = log_add(beam.n_p_nb, prev.p_nb + p_token);
                    }
                    self.expand(stream, prefix, prev, token, prev.p_b + p_token);
                } else {
                    self.expand(stream, prefix, prev, token, prev.score_ctc + p_token);
                }
            }
        }
    }

    /// Opens (or merges into) the beam for `prefix + [token]`.
    fn expand(
        &mut self,
        stream: &mut DecodeStream,
        prefix: &[i32],
        prev: &Beam,
        token: i32,
        contribution: f32,
    ) {
        if contribution == f32::NEG_INFINITY {
            return;
        }
        let mut extended: Prefix = Vec::with_capacity(prefix.len() + 1);
        extended.extend_from_slice(prefix);
        extended.push(token);
        let (beam, created) = stream.beams.get_or_create(extended, contribution);
        if created {
            // Word and scorer state are functions of the prefix alone, so
            // they are set once at creation; merges only add mass.
            beam.last_token = Some(token);
            beam.text = prev.text.clone();
            beam.lm_state = prev.lm_state.clone();
            beam.score_lm = prev.score_lm;
            if self.space == Some(token) {
                beam.partial_word = String::new();
                beam.next_word = prev.next_word.clone();
                if !prev.partial_word.is_empty() {
                    beam.next_word = prev.partial_word.clone();
                    push_word(&mut beam.text, &beam.next_word);
                    let (state, increment) = self.lm.score(&prev.lm_state, &beam.next_word);
                    beam.lm_state = state;
                    beam.score_lm += self.options.lm_weight * increment;
                }
            } else {
                beam.next_word = prev.next_word.clone();
                let mut word = prev.partial_word.clone();
                word.push_str(&self.vocab.labels()[token as usize]);
                beam.partial_word = word;
            }
        }
        beam.n_p_nb = log_add(beam.n_p_nb, contribution);
    }

    /// Current top-K snapshot, best first.
    fn hypotheses(&self, stream: &DecodeStream) -> Vec<DecoderOutput> {
        stream
            .beams
            .ranked()
            .into_iter()
            .take(self.options.topk)
            .map(|(prefix, beam)| {
                let mut text = beam.text.clone();
                if !beam.partial_word.is_empty() {
                    push_word(&mut text, &beam.partial_word);
                }
                DecoderOutput {
                    score: beam.score,
                    score_ctc: beam.score_ctc,
                    score_lm: beam.score_lm,
                    tokens: prefix.clone(),
                    text,
                }
            })
            .collect()
    }
}

impl<T: LM> Decoder for PrefixBeamSearch<T> {
    fn decode(
        &mut self,
        data: &[f32],
        steps: usize,
        n_vocab: usize,
    ) -> Result<Vec<DecoderOutput>, DecodeError> {
        let mut stream = self.begin();
        self.decode_chunk(&mut stream, data, steps, n_vocab)?;
        Ok(self.finish(stream))
    }
}

fn push_word(text: &mut String, word: &str) {
    if !text.is_empty() {
        text.push(' ');
    }
    text.push_str(word);
}
