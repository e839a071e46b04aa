//! N-gram counting shared by the caption scorers

use std::collections::HashMap;

/// N-gram counts keyed by token window
pub type NgramCounts<'t, 'a> = HashMap<&'t [&'a str], usize>;

/// Count all n-grams of order `1..=max_n`
///
/// The order of an n-gram is the length of its key.
pub fn count_ngrams<'t, 'a>(tokens: &'t [&'a str], max_n: usize) -> NgramCounts<'t, 'a> {
    let mut counts = HashMap::new();
    for n in 1..=max_n {
        for window in tokens.windows(n) {
            *counts.entry(window).or_insert(0) += 1;
        }
    }
    counts
}

/// Per-n-gram maximum count over several references (BLEU clipping)
pub fn max_counts<'t, 'a>(references: &'t [Vec<&'a str>], max_n: usize) -> NgramCounts<'t, 'a> {
    let mut maxima: NgramCounts<'t, 'a> = HashMap::new();
    for reference in references {
        for (ngram, count) in count_ngrams(reference, max_n) {
            let entry = maxima.entry(ngram).or_insert(0);
            *entry = (*entry).max(count);
        }
    }
    maxima
}
