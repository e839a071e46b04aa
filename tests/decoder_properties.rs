use informe::config::SampleMethod;
use informe::decode::{DecodeConfig, Decoder};
use informe::model::BigramReportModel;
use proptest::collection::vec;
use proptest::prelude::*;
use std::collections::HashSet;

const FEATURE_DIM: usize = 4;

fn method() -> impl Strategy<Value = SampleMethod> {
    prop_oneof![
        Just(SampleMethod::BeamSearch),
        Just(SampleMethod::Greedy),
        Just(SampleMethod::Sample),
    ]
}

fn decode_config(method: SampleMethod, beam_size: usize, max_seq_length: usize) -> DecodeConfig {
    DecodeConfig {
        method,
        beam_size,
        sample_n: 1,
        max_seq_length,
        ..DecodeConfig::default()
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_decoding_is_deterministic(
        method in method(),
        seed in any::<u64>(),
        vocab in 3usize..12,
        beam_size in 1usize..4,
        features in vec(-1.0f32..1.0, FEATURE_DIM),
    ) {
        let model = BigramReportModel::new(FEATURE_DIM, vocab, 0, seed);
        let config = decode_config(method, beam_size, 16);

        let first = Decoder::new(config.clone()).unwrap().generate(&model, &features).unwrap();
        let second = Decoder::new(config).unwrap().generate(&model, &features).unwrap();

        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_generated_length_is_bounded(
        method in method(),
        seed in any::<u64>(),
        vocab in 3usize..12,
        max_seq_length in 1usize..20,
        features in vec(-1.0f32..1.0, FEATURE_DIM),
    ) {
        let model = BigramReportModel::new(FEATURE_DIM, vocab, 0, seed);
        let mut decoder = Decoder::new(decode_config(method, 3, max_seq_length)).unwrap();

        for hyp in decoder.generate(&model, &features).unwrap() {
            prop_assert!(hyp.tokens.len() <= max_seq_length);
            prop_assert!(hyp.finished);
            prop_assert!(!hyp.tokens.contains(&0), "special token generated: {:?}", hyp.tokens);
            prop_assert!(hyp.tokens.iter().all(|&t| t < vocab));
        }
    }

    #[test]
    fn prop_blocked_trigrams_never_repeat(
        method in method(),
        seed in any::<u64>(),
        vocab in 3usize..6,
        features in vec(-1.0f32..1.0, FEATURE_DIM),
    ) {
        let model = BigramReportModel::new(FEATURE_DIM, vocab, 0, seed);
        let mut decoder = Decoder::new(decode_config(method, 3, 30)).unwrap();

        for hyp in decoder.generate(&model, &features).unwrap() {
            let mut seen = HashSet::new();
            for window in hyp.tokens.windows(3) {
                prop_assert!(seen.insert(window.to_vec()), "repeated trigram {:?} in {:?}", window, hyp.tokens);
            }
        }
    }

    #[test]
    fn prop_beam_output_is_sorted(
        seed in any::<u64>(),
        vocab in 3usize..10,
        beam_size in 2usize..5,
        features in vec(-1.0f32..1.0, FEATURE_DIM),
    ) {
        let model = BigramReportModel::new(FEATURE_DIM, vocab, 0, seed);
        let config = DecodeConfig {
            sample_n: beam_size,
            ..decode_config(SampleMethod::BeamSearch, beam_size, 12)
        };
        let hyps = Decoder::new(config).unwrap().generate(&model, &features).unwrap();

        prop_assert!(!hyps.is_empty() && hyps.len() <= beam_size);
        for pair in hyps.windows(2) {
            prop_assert!(pair[0].score(false) >= pair[1].score(false));
        }
    }
}

#[test]
fn reseeding_repeats_samples() {
    let model = BigramReportModel::new(FEATURE_DIM, 8, 0, 11);
    let config = DecodeConfig {
        method: SampleMethod::Sample,
        sample_n: 4,
        temperature: 1.5,
        ..DecodeConfig::default()
    };
    let features = [0.3, -0.2, 0.9, 0.0];
    let mut decoder = Decoder::new(config).unwrap();

    let first = decoder.generate(&model, &features).unwrap();
    decoder.reseed();
    let second = decoder.generate(&model, &features).unwrap();

    assert_eq!(first, second);
}

#[test]
fn beam_size_one_matches_greedy() {
    let model = BigramReportModel::new(FEATURE_DIM, 9, 0, 3);
    let features = [1.0, 0.5, -0.5, -1.0];

    let beam = Decoder::new(decode_config(SampleMethod::BeamSearch, 1, 20))
        .unwrap()
        .generate(&model, &features)
        .unwrap();
    let greedy = Decoder::new(decode_config(SampleMethod::Greedy, 1, 20))
        .unwrap()
        .generate(&model, &features)
        .unwrap();

    assert_eq!(beam[0].tokens, greedy[0].tokens);
}
