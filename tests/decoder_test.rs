use approx::assert_relative_eq;
use prefixbeam::{
    DecodeError, Decoder, GreedyDecoder, PrefixBeamSearch, PrefixBeamSearchOptions, Vocab, ZeroLM,
};

fn vocab() -> Vocab {
    Vocab::from_labels(["_", "A", "B"]).unwrap()
}

fn searcher(options: PrefixBeamSearchOptions) -> PrefixBeamSearch<ZeroLM> {
    PrefixBeamSearch::new(options, vocab(), 0, ZeroLM).unwrap()
}

fn scenario_data() -> Vec<f32> {
    #[rustfmt::skip]
    let probs: [f32; 9] = [
        0.9, 0.05, 0.05,
        0.1, 0.8,  0.1,
        0.1, 0.1,  0.8,
    ];
    probs.iter().map(|p| p.ln()).collect()
}

#[test]
fn it_decodes_the_expected_top_hypothesis() {
    let options = PrefixBeamSearchOptions {
        beam_width: 4,
        topk: 4,
        ..Default::default()
    };
    let outputs = searcher(options).decode(&scenario_data(), 3, 3).unwrap();
    assert_eq!(outputs[0].tokens, vec![1, 2]);
    assert_eq!(outputs[0].text, "AB");
    // All surviving paths through A then B: 0.765 * 0.8 of the total mass.
    assert_relative_eq!(outputs[0].score_ctc, 0.612f32.ln(), epsilon = 1e-3);
    assert_eq!(outputs[0].score_lm, 0.0);
    assert_eq!(outputs[0].score, outputs[0].score_ctc + outputs[0].score_lm);
    for pair in outputs.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

#[test]
fn repeated_labels_collapse_without_a_blank() {
    let vocab = Vocab::from_labels(["_", "x"]).unwrap();
    let mut decoder =
        PrefixBeamSearch::new(PrefixBeamSearchOptions::default(), vocab, 0, ZeroLM).unwrap();
    #[rustfmt::skip]
    let probs: [f32; 4] = [
        0.1, 0.9,
        0.1, 0.9,
    ];
    let data: Vec<f32> = probs.iter().map(|p| p.ln()).collect();
    let outputs = decoder.decode(&data, 2, 2).unwrap();
    assert_eq!(outputs[0].tokens, vec![1]);
    assert_eq!(outputs[0].text, "x");
}

#[test]
fn paths_landing_on_one_prefix_merge_their_mass() {
    let vocab = Vocab::from_labels(["_", "a"]).unwrap();
    let options = PrefixBeamSearchOptions {
        topk: 2,
        ..Default::default()
    };
    let mut decoder = PrefixBeamSearch::new(options, vocab, 0, ZeroLM).unwrap();
    #[rustfmt::skip]
    let probs: [f32; 4] = [
        0.5, 0.5,
        0.5, 0.5,
    ];
    let data: Vec<f32> = probs.iter().map(|p| p.ln()).collect();
    let outputs = decoder.decode(&data, 2, 2).unwrap();
    // "a" absorbs the paths (a,a), (a,_) and (_,a); only (_,_) stays empty.
    assert_eq!(outputs[0].tokens, vec![1]);
    assert_relative_eq!(outputs[0].score_ctc, 0.75f32.ln(), epsilon = 1e-6);
    assert_eq!(outputs[1].tokens, Vec::<i32>::new());
    assert_relative_eq!(outputs[1].score_ctc, 0.25f32.ln(), epsilon = 1e-6);
}

#[test]
fn an_extra_blank_frame_keeps_the_top_sequence() {
    let base = searcher(PrefixBeamSearchOptions::default())
        .decode(&scenario_data(), 3, 3)
        .unwrap();

    let data = scenario_data();
    let mut padded = data[..3].to_vec();
    padded.extend([0.98f32, 0.01, 0.01].iter().map(|p| p.ln()));
    padded.extend_from_slice(&data[3..]);
    let outputs = searcher(PrefixBeamSearchOptions::default())
        .decode(&padded, 4, 3)
        .unwrap();
    assert_eq!(outputs[0].tokens, base[0].tokens);
    assert_eq!(outputs[0].text, base[0].text);
}

#[test]
fn identical_inputs_decode_identically() {
    let options = PrefixBeamSearchOptions {
        topk: 4,
        ..Default::default()
    };
    let first = searcher(options.clone()).decode(&scenario_data(), 3, 3).unwrap();
    let second = searcher(options).decode(&scenario_data(), 3, 3).unwrap();
    assert_eq!(first, second);
}

#[test]
fn chunked_decoding_matches_the_whole_utterance() {
    let options = PrefixBeamSearchOptions {
        topk: 3,
        ..Default::default()
    };
    let data = scenario_data();
    let whole = searcher(options.clone()).decode(&data, 3, 3).unwrap();

    let mut decoder = searcher(options);
    let mut stream = decoder.begin();
    let partial = decoder.decode_chunk(&mut stream, &data[..6], 2, 3).unwrap();
    assert!(!partial.is_empty());
    decoder.decode_chunk(&mut stream, &data[6..], 1, 3).unwrap();
    assert_eq!(stream.processed_frames(), 3);
    assert_eq!(decoder.finish(stream), whole);
}

#[test]
fn malformed_input_is_rejected_before_decoding() {
    let mut decoder = searcher(PrefixBeamSearchOptions::default());
    assert_eq!(decoder.decode(&[], 0, 3), Err(DecodeError::EmptyInput));
    assert_eq!(
        decoder.decode(&[0.0; 8], 2, 4),
        Err(DecodeError::VocabMismatch { width: 4, vocab: 3 })
    );
    assert_eq!(
        decoder.decode(&[0.0; 8], 3, 3),
        Err(DecodeError::ShapeMismatch {
            len: 8,
            steps: 3,
            width: 3,
        })
    );

    let mut bad = scenario_data();
    bad[4] = f32::NAN;
    assert_eq!(
        decoder.decode(&bad, 3, 3),
        Err(DecodeError::NonFinite { frame: 1, label: 1 })
    );
    bad[4] = f32::INFINITY;
    assert_eq!(
        decoder.decode(&bad, 3, 3),
        Err(DecodeError::NonFinite { frame: 1, label: 1 })
    );
}

#[test]
fn configuration_errors_surface_at_construction() {
    assert!(matches!(
        PrefixBeamSearch::new(PrefixBeamSearchOptions::default(), vocab(), 7, ZeroLM),
        Err(DecodeError::InvalidBlank { index: 7, vocab: 3 })
    ));
    assert!(matches!(
        PrefixBeamSearch::new(PrefixBeamSearchOptions::default(), vocab(), -1, ZeroLM),
        Err(DecodeError::InvalidBlank { .. })
    ));
    let options = PrefixBeamSearchOptions {
        beam_width: 0,
        ..Default::default()
    };
    assert!(matches!(
        PrefixBeamSearch::new(options, vocab(), 0, ZeroLM),
        Err(DecodeError::InvalidBeamWidth)
    ));
}

#[test]
fn an_injected_logger_observes_the_decode() {
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct CountingLogger(Arc<Mutex<usize>>);

    impl prefixbeam::DecodeLogger for CountingLogger {
        fn frame(&mut self, _frame: usize, _beams: usize) {
            *self.0.lock().unwrap() += 1;
        }
        fn pruned(&mut self, _frame: usize, _before: usize, _after: usize) {}
        fn info(&mut self, _message: &str) {}
    }

    let frames = Arc::new(Mutex::new(0));
    let logger = CountingLogger(frames.clone());
    let mut decoder = searcher(PrefixBeamSearchOptions::default()).with_logger(Box::new(logger));
    decoder.decode(&scenario_data(), 3, 3).unwrap();
    assert_eq!(*frames.lock().unwrap(), 3);
}

#[test]
fn greedy_agrees_with_beam_search_on_unambiguous_input() {
    let mut greedy = GreedyDecoder::new(vocab(), 0).unwrap();
    let outputs = greedy.decode(&scenario_data(), 3, 3).unwrap();
    assert_eq!(outputs[0].tokens, vec![1, 2]);
    assert_eq!(outputs[0].text, "AB");
    let expected = 0.9f32.ln() + 0.8f32.ln() + 0.8f32.ln();
    assert_relative_eq!(outputs[0].score, expected, epsilon = 1e-6);
}
