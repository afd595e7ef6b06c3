use std::{
    cell::RefCell,
    collections::HashMap,
    fmt::Debug,
    hash::{Hash, Hasher},
    rc::Rc,
};

#[derive(Debug, Default)]
struct LMState {
    children: HashMap<String, LMStateRef>,
}

/// A reference to a scorer state.
/// LMStateRef identifies the word sequence scored so far; two hypotheses
/// share a state exactly when they reached it through the same words, so
/// scorers can key their own caches by it.
#[derive(Clone, Default)]
pub struct LMStateRef(Rc<RefCell<LMState>>);

impl LMStateRef {
    /// Create a root LMStateRef.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the child state reached by `word`.
    /// If the state already has a child for the same word, that child is
    /// returned; otherwise a new one is created.
    pub fn child(&self, word: &str) -> LMStateRef {
        let mut state = self.0.borrow_mut();
        if let Some(child) = state.children.get(word) {
            return child.clone();
        }
        let child = LMStateRef::new();
        state.children.insert(word.to_owned(), child.clone());
        child
    }
}

impl Debug for LMStateRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:p}", self.0.as_ptr())
    }
}

impl PartialEq for LMStateRef {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_ptr() == other.0.as_ptr()
    }
}

impl Eq for LMStateRef {}

impl Hash for LMStateRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_usize(self.0.as_ptr() as usize);
    }
}

/// LM is a wrapper of a language model for decoding. Scoring happens at
/// word boundaries: the engine hands over each completed word and, at the
/// end of the utterance, asks for the end-of-sequence increment.
pub trait LM {
    /// Initializes the scorer, then returns the root state.
    fn start(&mut self) -> LMStateRef;
    /// Returns the state reached from `state` by `word` and the
    /// log-probability increment of that word.
    fn score(&mut self, state: &LMStateRef, word: &str) -> (LMStateRef, f32);
    /// Returns the final state and the end-of-sequence increment.
    fn finish(&mut self, state: &LMStateRef) -> (LMStateRef, f32);
}

/// ZeroLM is a language model that always returns 0.
/// This is a stub implementation of LM for acoustic-only decoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroLM;

impl LM for ZeroLM {
    fn start(&mut self) -> LMStateRef {
        LMStateRef::new()
    }

    fn score(&mut self, state: &LMStateRef, word: &str) -> (LMStateRef, f32) {
        (state.child(word), 0.0)
    }

    fn finish(&mut self, state: &LMStateRef) -> (LMStateRef, f32) {
        (state.clone(), 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_word_reaches_the_same_state() {
        let root = LMStateRef::new();
        let a = root.child("a");
        let b = root.child("a");
        assert_eq!(a, b);
        assert_ne!(a, root.child("c"));
        assert_ne!(a, root);
    }

    #[test]
    fn zero_lm_scores_nothing() {
        let mut lm = ZeroLM;
        let root = lm.start();
        let (next, score) = lm.score(&root, "hello");
        assert_eq!(score, 0.0);
        assert_ne!(next, root);
        let (fin, score) = lm.finish(&next);
        assert_eq!(score, 0.0);
        assert_eq!(fin, next);
    }
}
