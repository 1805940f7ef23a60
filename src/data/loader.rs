// ============================================================
// Layer 4 — Caption Table Loader
// ============================================================
// Reads the caption table, a CSV file with a header row:
//
//   image,caption
//   1000268201_693b08cb0e.jpg,A child in a pink dress is climbing ...
//   1000268201_693b08cb0e.jpg,A girl going into a wooden building .
//   ...
//
// Every row becomes one CaptionSample. Images normally appear on
// five consecutive rows, one per human caption.
//
// Rows with an empty caption are skipped with a warning instead
// of failing the whole load: one bad annotation should not stop
// a training run.
//
// CaptionTable groups the same rows by image id for the
// multi-reference BLEU policy.
//
// Reference: csv crate documentation (serde deserialisation)

use std::{collections::HashMap, path::PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::domain::sample::CaptionSample;
use crate::domain::traits::{CaptionSource, ReferenceLookup};

/// Raw CSV row, mapped by header name so column order is free.
#[derive(Debug, Deserialize)]
struct CaptionRow {
    image:   String,
    caption: String,
}

/// Loads caption rows from a CSV file.
/// Implements the CaptionSource trait from Layer 3.
pub struct CsvCaptionLoader {
    path: PathBuf,
}

impl CsvCaptionLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CaptionSource for CsvCaptionLoader {
    fn load_all(&self) -> Result<Vec<CaptionSample>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_path(&self.path)
            .with_context(|| format!("Cannot open caption table '{}'", self.path.display()))?;

        let mut samples = Vec::new();
        let mut skipped = 0usize;

        for (line, row) in reader.deserialize::<CaptionRow>().enumerate() {
            let row = row.with_context(|| {
                format!("Malformed row {} in '{}'", line + 2, self.path.display())
            })?;

            if row.caption.is_empty() || row.image.is_empty() {
                tracing::warn!("Skipping row {}: empty image id or caption", line + 2);
                skipped += 1;
                continue;
            }
            samples.push(CaptionSample::new(row.image, row.caption));
        }

        tracing::info!(
            "Loaded {} captions from '{}' ({} skipped)",
            samples.len(),
            self.path.display(),
            skipped
        );
        Ok(samples)
    }
}

// ─── CaptionTable ─────────────────────────────────────────────────────────────
/// All captions grouped by image id, in first-seen order per image.
#[derive(Debug, Clone, Default)]
pub struct CaptionTable {
    by_image: HashMap<String, Vec<String>>,
}

impl CaptionTable {
    pub fn from_samples(samples: &[CaptionSample]) -> Self {
        let mut by_image: HashMap<String, Vec<String>> = HashMap::new();
        for s in samples {
            by_image
                .entry(s.image_id.clone())
                .or_default()
                .push(s.caption.clone());
        }
        Self { by_image }
    }

    /// Number of distinct images.
    pub fn image_count(&self) -> usize {
        self.by_image.len()
    }
}

impl ReferenceLookup for CaptionTable {
    fn references(&self, image_id: &str) -> Vec<String> {
        self.by_image.get(image_id).cloned().unwrap_or_default()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn test_loads_rows_by_header_name() {
        let f = write_csv("caption,image\nA dog runs,1.jpg\nA cat sleeps,2.jpg\n");
        let samples = CsvCaptionLoader::new(f.path()).load_all().unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0], CaptionSample::new("1.jpg", "A dog runs"));
    }

    #[test]
    fn test_captions_with_commas_are_quoted() {
        let f = write_csv("image,caption\n1.jpg,\"A dog, running fast\"\n");
        let samples = CsvCaptionLoader::new(f.path()).load_all().unwrap();
        assert_eq!(samples[0].caption, "A dog, running fast");
    }

    #[test]
    fn test_empty_captions_are_skipped() {
        let f = write_csv("image,caption\n1.jpg,\n2.jpg,A cat\n");
        let samples = CsvCaptionLoader::new(f.path()).load_all().unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].image_id, "2.jpg");
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let loader = CsvCaptionLoader::new("/definitely/not/here.csv");
        assert!(loader.load_all().is_err());
    }

    #[test]
    fn test_table_groups_references_by_image() {
        let samples = vec![
            CaptionSample::new("1.jpg", "a dog"),
            CaptionSample::new("2.jpg", "a cat"),
            CaptionSample::new("1.jpg", "a brown dog"),
        ];
        let table = CaptionTable::from_samples(&samples);
        assert_eq!(table.image_count(), 2);
        assert_eq!(table.references("1.jpg"), vec!["a dog", "a brown dog"]);
        assert!(table.references("3.jpg").is_empty());
    }
}
