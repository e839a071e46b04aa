use informe::metrics::{
    CaptionScorer, Corpus, Hypotheses, MetricScorer, References, METRIC_NAMES,
};
use informe::{Error, Result};
use proptest::collection::vec;
use proptest::prelude::*;

fn refs(entries: &[(&str, &str)]) -> References {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), vec![v.to_string()]))
        .collect()
}

fn hyps(entries: &[(&str, &str)]) -> Hypotheses {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

struct BrokenRouge;

impl CaptionScorer for BrokenRouge {
    fn name(&self) -> &str {
        "Rouge"
    }

    fn labels(&self) -> &[&'static str] {
        &["ROUGE_L"]
    }

    fn compute(&self, _corpus: &Corpus<'_>) -> Result<Vec<f64>> {
        Err(Error::scorer("Rouge", "out of memory"))
    }
}

#[test]
fn single_sample_report_has_every_metric() {
    let report = MetricScorer::new()
        .score(
            &refs(&[("p1", "the lungs are clear")]),
            &hyps(&[("p1", "lungs clear")]),
        )
        .unwrap();

    assert_eq!(report.len(), 6);
    for name in METRIC_NAMES {
        let value = report.get(name).unwrap();
        assert!(value >= 0.0, "{name} = {value}");
        if name != "CIDEr" {
            assert!(value <= 1.0, "{name} = {value}");
        }
    }
}

#[test]
fn disjoint_keys_are_fatal() {
    let result = MetricScorer::new().score(
        &refs(&[("a", "the heart is normal")]),
        &hyps(&[("b", "the heart is normal")]),
    );

    match result {
        Err(Error::KeyMismatch {
            missing_in_hypotheses,
            missing_in_references,
        }) => {
            assert_eq!(missing_in_hypotheses, vec!["a".to_string()]);
            assert_eq!(missing_in_references, vec!["b".to_string()]);
        }
        other => panic!("expected KeyMismatch, got {other:?}"),
    }
}

#[test]
fn empty_collections_score_zero() {
    let report = MetricScorer::new()
        .score(&References::new(), &Hypotheses::new())
        .unwrap();

    assert_eq!(report.len(), 6);
    assert!(report.iter().all(|(_, v)| v == 0.0));
}

#[test]
fn failing_family_does_not_affect_the_others() {
    let scorer = MetricScorer::with_scorers(vec![
        Box::new(informe::metrics::Bleu::default()),
        Box::new(BrokenRouge),
        Box::new(informe::metrics::Cider::default()),
    ]);
    let references = refs(&[("a", "the lungs are clear"), ("b", "no pleural effusion")]);
    let hypotheses = hyps(&[("a", "the lungs are clear"), ("b", "no effusion")]);

    let report = scorer.score(&references, &hypotheses).unwrap();

    assert_eq!(report.get("ROUGE_L"), Some(0.0));
    assert!(report.get("BLEU_1").unwrap() > 0.0);
    assert!(report.get("CIDEr").unwrap() > 0.0);
}

#[test]
fn empty_hypothesis_scores_zero_for_that_sample_only() {
    let references: References = (0..100)
        .map(|i| (format!("s{i:03}"), vec!["the lungs are clear".to_string()]))
        .collect();
    let mut hypotheses: Hypotheses = (0..100)
        .map(|i| (format!("s{i:03}"), "the lungs are clear".to_string()))
        .collect();
    hypotheses.insert("s099".to_string(), String::new());

    let report = MetricScorer::new().score(&references, &hypotheses).unwrap();

    approx::assert_abs_diff_eq!(report.get("ROUGE_L").unwrap(), 0.99, epsilon = 1e-9);
    assert!(report.get("BLEU_1").unwrap() > 0.9);
}

#[test]
fn one_sided_empty_input_is_key_mismatch() {
    let result = MetricScorer::new().score(&References::new(), &hyps(&[("a", "clear")]));
    assert!(matches!(result, Err(Error::KeyMismatch { .. })));
}

#[test]
fn identical_reports_score_perfect_bleu() {
    let text = "the cardiomediastinal silhouette is within normal limits";
    let report = MetricScorer::new()
        .score(&refs(&[("a", text)]), &hyps(&[("a", text)]))
        .unwrap();

    for name in ["BLEU_1", "BLEU_2", "BLEU_3", "BLEU_4", "ROUGE_L"] {
        approx::assert_abs_diff_eq!(report.get(name).unwrap(), 1.0, epsilon = 1e-6);
    }
}

const WORDS: [&str; 8] = [
    "the", "lungs", "are", "clear", "heart", "normal", "no", "effusion",
];

fn sentence() -> impl Strategy<Value = String> {
    vec(0..WORDS.len(), 1..12)
        .prop_map(|idx| idx.into_iter().map(|i| WORDS[i]).collect::<Vec<_>>().join(" "))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_metrics_stay_in_range(pairs in vec((sentence(), sentence()), 1..8)) {
        let mut references = References::new();
        let mut hypotheses = Hypotheses::new();
        for (i, (r, h)) in pairs.into_iter().enumerate() {
            references.insert(format!("s{i}"), vec![r]);
            hypotheses.insert(format!("s{i}"), h);
        }

        let report = MetricScorer::new().score(&references, &hypotheses).unwrap();

        prop_assert_eq!(report.len(), 6);
        for (name, value) in report.iter() {
            prop_assert!(value.is_finite(), "{} is not finite", name);
            prop_assert!(value >= 0.0, "{} = {} is negative", name, value);
            if name != "CIDEr" {
                prop_assert!(value <= 1.0 + 1e-9, "{} = {} exceeds 1", name, value);
            }
        }
    }

    #[test]
    fn prop_key_order_does_not_matter(pairs in vec((sentence(), sentence()), 1..6)) {
        let mut forward_refs = References::new();
        let mut forward_hyps = Hypotheses::new();
        let mut renamed_refs = References::new();
        let mut renamed_hyps = Hypotheses::new();
        let n = pairs.len();
        for (i, (r, h)) in pairs.into_iter().enumerate() {
            forward_refs.insert(format!("a{i}"), vec![r.clone()]);
            forward_hyps.insert(format!("a{i}"), h.clone());
            renamed_refs.insert(format!("b{}", n - i), vec![r]);
            renamed_hyps.insert(format!("b{}", n - i), h);
        }

        let scorer = MetricScorer::new();
        let a = scorer.score(&forward_refs, &forward_hyps).unwrap();
        let b = scorer.score(&renamed_refs, &renamed_hyps).unwrap();

        for name in METRIC_NAMES {
            let (x, y) = (a.get(name).unwrap(), b.get(name).unwrap());
            prop_assert!((x - y).abs() < 1e-9, "{}: {} vs {}", name, x, y);
        }
    }
}
