// ============================================================
// Layer 4 — Image-Disjoint Train/Test Splitter
// ============================================================
// Every image carries several captions. Splitting by ROW would
// put captions of one image on both sides and leak the test
// images into training, inflating BLEU.
//
// So the split works on image ids:
//   1. Collect the distinct image ids in first-seen order
//   2. Shuffle them with a seeded RNG (Fisher-Yates)
//   3. Move whole image groups into the test set until it holds
//      at least floor(test_fraction * rows) rows
//   4. Everything else is training data
//
// Rows keep their original relative order inside each side.
// The same (samples, fraction, seed) always gives the same split.
//
// Reference: rand crate documentation (SliceRandom)

use std::collections::{HashMap, HashSet};

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::domain::sample::CaptionSample;

/// Split `samples` into (train, test) with no image id on both sides.
pub fn split_by_image(
    samples:       Vec<CaptionSample>,
    test_fraction: f64,
    seed:          u64,
) -> (Vec<CaptionSample>, Vec<CaptionSample>) {
    let total  = samples.len();
    let target = ((total as f64) * test_fraction.clamp(0.0, 1.0)).floor() as usize;

    // Rows per image, and image ids in first-seen order
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut ids: Vec<&str> = Vec::new();
    for s in &samples {
        let c = counts.entry(s.image_id.as_str()).or_insert(0);
        if *c == 0 {
            ids.push(s.image_id.as_str());
        }
        *c += 1;
    }

    let mut rng = StdRng::seed_from_u64(seed);
    ids.shuffle(&mut rng);

    let mut test_ids: HashSet<String> = HashSet::new();
    let mut test_rows = 0usize;
    for id in ids {
        if test_rows >= target {
            break;
        }
        test_rows += counts[id];
        test_ids.insert(id.to_string());
    }

    let (test, train): (Vec<_>, Vec<_>) = samples
        .into_iter()
        .partition(|s| test_ids.contains(&s.image_id));

    tracing::debug!(
        "Image split: {} train rows, {} test rows ({} test images)",
        train.len(),
        test.len(),
        test_ids.len()
    );

    (train, test)
}
