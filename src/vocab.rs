use rustc_hash::FxHashMap;
use std::{
    fs::File,
    io::{BufRead, BufReader, Read},
    path::Path,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VocabError {
    #[error("duplicate label in vocabulary: {0:?}")]
    DuplicateLabel(String),
    #[error("label index out of range: {0}")]
    MissingIndex(i32),
    #[error("label not in vocabulary: {0:?}")]
    MissingLabel(String),
    #[error("failed to load vocabulary")]
    Load(#[from] std::io::Error),
}

/// An ordered set of label strings, index-aligned with the columns of the
/// log-probability matrix handed to a decoder.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Vocab {
    labels: Vec<String>,
    label2idx: FxHashMap<String, i32>,
}

impl Vocab {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_labels<I, S>(labels: I) -> Result<Self, VocabError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut vocab = Self::new();
        for label in labels {
            vocab.add_label(label.into())?;
        }
        Ok(vocab)
    }

    pub fn read<P: AsRef<Path>>(p: P) -> Result<Self, VocabError> {
        let file = File::open(p)?;
        Self::parse(file)
    }

    /// Parses one label per line. Only line terminators are stripped, so a
    /// bare-space separator label survives loading.
    pub fn parse(p: impl Read) -> Result<Self, VocabError> {
        let mut vocab = Self::new();
        let buf = BufReader::new(p);
        for line in buf.lines() {
            let line = line?;
            vocab.add_label(line.trim_end_matches(['\r', '\n']).to_owned())?;
        }
        Ok(vocab)
    }

    pub fn len(&self) -> usize {
        debug_assert!(self.labels.len() == self.label2idx.len());
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn add_label(&mut self, label: String) -> Result<i32, VocabError> {
        if self.label2idx.contains_key(&label) {
            return Err(VocabError::DuplicateLabel(label));
        }
        let idx = self.labels.len() as i32;
        self.label2idx.insert(label.clone(), idx);
        self.labels.push(label);
        Ok(idx)
    }

    pub fn label(&self, idx: i32) -> Result<&str, VocabError> {
        usize::try_from(idx)
            .ok()
            .and_then(|i| self.labels.get(i))
            .map(String::as_str)
            .ok_or(VocabError::MissingIndex(idx))
    }

    pub fn index(&self, label: &str) -> Result<i32, VocabError> {
        match self.label2idx.get(label) {
            Some(&idx) => Ok(idx),
            None => Err(VocabError::MissingLabel(label.to_owned())),
        }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_one_label_per_line() {
        let vocab = Vocab::parse("_\na\nb\n \n".as_bytes()).unwrap();
        assert_eq!(vocab.len(), 4);
        assert_eq!(vocab.label(0).unwrap(), "_");
        assert_eq!(vocab.index(" ").unwrap(), 3);
    }

    #[test]
    fn rejects_duplicates() {
        let err = Vocab::from_labels(["a", "b", "a"]).unwrap_err();
        assert!(matches!(err, VocabError::DuplicateLabel(l) if l == "a"));
    }

    #[test]
    fn reports_missing_lookups() {
        let vocab = Vocab::from_labels(["a"]).unwrap();
        assert!(matches!(vocab.label(3), Err(VocabError::MissingIndex(3))));
        assert!(matches!(vocab.label(-1), Err(VocabError::MissingIndex(-1))));
        assert!(matches!(vocab.index("z"), Err(VocabError::MissingLabel(_))));
    }
}
