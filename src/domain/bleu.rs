// ============================================================
// Layer 3 — Corpus BLEU
// ============================================================
// BLEU compares generated captions (hypotheses) with one or more
// human captions (references) by n-gram overlap.
//
// Corpus-level, not sentence-level:
//   Clipped n-gram matches and n-gram totals are summed over the
//   WHOLE corpus first; precision is computed once from the sums.
//   Averaging per-sentence scores gives a different (and noisier)
//   number.
//
// For each hypothesis and each order n in 1..=4:
//   matches[n] += Σ min(count_hyp(g), max_r count_ref_r(g))
//   totals[n]  += max(1, number of n-grams in the hypothesis)
//
// Lengths:
//   c = Σ hypothesis lengths
//   r = Σ length of the reference closest in length to each
//       hypothesis (ties go to the shorter reference)
//
// BLEU-k = BP · exp( (1/k) · Σ_{n=1..k} ln(matches[n] / totals[n]) )
//   BP = 1               if c > r
//        exp(1 - r / c)  otherwise (0 when c = 0)
//
// Any order with zero matches makes BLEU-k exactly 0. An empty
// corpus therefore scores 0 everywhere instead of dividing by 0.
//
// Reference: Papineni et al. (2002) BLEU

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub const MAX_ORDER: usize = 4;

/// The four cumulative scores of an evaluation run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BleuReport {
    pub bleu1: f64,
    pub bleu2: f64,
    pub bleu3: f64,
    pub bleu4: f64,
    /// Number of hypotheses that went into the scores
    pub hypotheses: usize,
}

/// Running n-gram statistics for a corpus of hypotheses.
#[derive(Debug, Clone, Default)]
pub struct CorpusBleu {
    matches:    [usize; MAX_ORDER],
    totals:     [usize; MAX_ORDER],
    hyp_length: usize,
    ref_length: usize,
    sentences:  usize,
}

impl CorpusBleu {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one hypothesis together with its acceptable references.
    pub fn add<S: AsRef<str>>(&mut self, hypothesis: &[S], references: &[Vec<S>]) {
        let hyp: Vec<&str> = hypothesis.iter().map(AsRef::as_ref).collect();
        let refs: Vec<Vec<&str>> = references
            .iter()
            .map(|r| r.iter().map(AsRef::as_ref).collect())
            .collect();

        for n in 1..=MAX_ORDER {
            let hyp_counts = ngram_counts(&hyp, n);

            // Highest count of each n-gram in any single reference
            let mut max_ref_counts: HashMap<&[&str], usize> = HashMap::new();
            for r in &refs {
                for (gram, count) in ngram_counts(r, n) {
                    let slot = max_ref_counts.entry(gram).or_insert(0);
                    *slot = (*slot).max(count);
                }
            }

            let clipped: usize = hyp_counts
                .iter()
                .map(|(gram, &count)| count.min(max_ref_counts.get(gram).copied().unwrap_or(0)))
                .sum();
            let total: usize = hyp_counts.values().sum();

            self.matches[n - 1] += clipped;
            self.totals[n - 1]  += total.max(1);
        }

        self.hyp_length += hyp.len();
        self.ref_length += closest_ref_length(hyp.len(), &refs);
        self.sentences  += 1;
    }

    pub fn len(&self) -> usize {
        self.sentences
    }

    pub fn is_empty(&self) -> bool {
        self.sentences == 0
    }

    /// Cumulative BLEU up to `order` (1..=4) with uniform weights.
    pub fn score(&self, order: usize) -> f64 {
        let order = order.clamp(1, MAX_ORDER);

        if self.matches[..order].iter().any(|&m| m == 0) {
            return 0.0;
        }

        let log_precision: f64 = (0..order)
            .map(|i| (self.matches[i] as f64 / self.totals[i] as f64).ln())
            .sum::<f64>()
            / order as f64;

        self.brevity_penalty() * log_precision.exp()
    }

    fn brevity_penalty(&self) -> f64 {
        let c = self.hyp_length as f64;
        let r = self.ref_length as f64;
        if c > r {
            1.0
        } else if self.hyp_length == 0 {
            0.0
        } else {
            (1.0 - r / c).exp()
        }
    }

    pub fn report(&self) -> BleuReport {
        BleuReport {
            bleu1:      self.score(1),
            bleu2:      self.score(2),
            bleu3:      self.score(3),
            bleu4:      self.score(4),
            hypotheses: self.sentences,
        }
    }
}

fn ngram_counts<'a, 'b>(tokens: &'b [&'a str], n: usize) -> HashMap<&'b [&'a str], usize> {
    let mut counts = HashMap::new();
    if tokens.len() >= n {
        for gram in tokens.windows(n) {
            *counts.entry(gram).or_insert(0) += 1;
        }
    }
    counts
}

fn closest_ref_length(hyp_len: usize, refs: &[Vec<&str>]) -> usize {
    refs.iter()
        .map(Vec::len)
        .min_by_key(|&len| (len.abs_diff(hyp_len), len))
        .unwrap_or(0)
}
