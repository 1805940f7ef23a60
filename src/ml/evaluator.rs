// ============================================================
// Layer 5 — BLEU Evaluator
// ============================================================
// Greedy-decodes every image of a dataset and scores the
// captions against references with corpus BLEU-1..4.
//
// Both sides are compared as token strings with <pad>, <sos> and
// <eos> stripped. Where the references come from:
//
//   Single — the sample's own caption, read back from its ids
//   Multi  — every caption of the image id, tokenised from the
//            raw text (so words below the vocabulary threshold
//            still count as reference words)
//
// Run this on the inner backend (`model.valid()`): no autodiff
// graph, dropout inactive.
//
// Reference: Papineni et al. (2002) BLEU

use anyhow::Result;
use burn::{data::dataloader::DataLoaderBuilder, prelude::*};
use serde::{Deserialize, Serialize};

use crate::data::{
    batcher::{CaptionBatch, CaptionBatcher},
    dataset::CaptionDataset,
};
use crate::domain::{
    bleu::{BleuReport, CorpusBleu},
    traits::ReferenceLookup,
    vocabulary::Vocabulary,
};
use crate::ml::{
    decoding::{generate, Generation},
    model::Captioner,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferencePolicy {
    Single,
    Multi,
}

pub struct BleuEvaluator<'a> {
    vocab:       &'a Vocabulary,
    references:  Option<&'a dyn ReferenceLookup>,
    max_len:     usize,
    max_batches: Option<usize>,
}

impl<'a> BleuEvaluator<'a> {
    /// Single-reference evaluator.
    pub fn new(vocab: &'a Vocabulary, max_len: usize) -> Self {
        Self { vocab, references: None, max_len, max_batches: None }
    }

    /// Score against every caption `lookup` knows for the image.
    pub fn with_references(mut self, lookup: &'a dyn ReferenceLookup) -> Self {
        self.references = Some(lookup);
        self
    }

    /// Stop after `max_batches` batches (None evaluates everything).
    pub fn with_max_batches(mut self, max_batches: Option<usize>) -> Self {
        self.max_batches = max_batches;
        self
    }

    pub fn policy(&self) -> ReferencePolicy {
        match self.references {
            Some(_) => ReferencePolicy::Multi,
            None    => ReferencePolicy::Single,
        }
    }

    /// Evaluate over a dataset, batched in file order.
    pub fn evaluate_dataset<B, M>(
        &self,
        model:      &M,
        dataset:    CaptionDataset,
        batch_size: usize,
        device:     &B::Device,
    ) -> Result<BleuReport>
    where
        B: Backend,
        M: Captioner<B>,
    {
        let image_size = dataset.transform().output_size() as usize;
        let loader = DataLoaderBuilder::new(CaptionBatcher::<B>::new(device.clone(), image_size))
            .batch_size(batch_size)
            .num_workers(1)
            .build(dataset);

        self.evaluate(model, loader.iter().flatten())
    }

    pub fn evaluate<B, M, I>(&self, model: &M, batches: I) -> Result<BleuReport>
    where
        B: Backend,
        M: Captioner<B>,
        I: IntoIterator<Item = CaptionBatch<B>>,
    {
        let mut bleu = CorpusBleu::new();
        let limit = self.max_batches.unwrap_or(usize::MAX);

        for (i, batch) in batches.into_iter().take(limit).enumerate() {
            let generations = generate(model, batch.images, self.max_len)?;
            self.add_batch(&mut bleu, &generations, &batch.tokens, &batch.image_ids);
            tracing::debug!("Evaluated batch {} ({} captions so far)", i + 1, bleu.len());
        }

        let report = bleu.report();
        tracing::info!(
            "BLEU over {} captions ({:?} references): {:.4} / {:.4} / {:.4} / {:.4}",
            report.hypotheses,
            self.policy(),
            report.bleu1,
            report.bleu2,
            report.bleu3,
            report.bleu4
        );
        Ok(report)
    }

    fn add_batch(
        &self,
        bleu:        &mut CorpusBleu,
        generations: &[Generation],
        tokens:      &[Vec<u32>],
        image_ids:   &[String],
    ) {
        for ((generation, ids), image_id) in generations.iter().zip(tokens).zip(image_ids) {
            let hypothesis = self.vocab.strip_reserved(&generation.tokens);
            let references = self.references_for(image_id, ids);
            bleu.add(&hypothesis, &references);
        }
    }

    fn references_for(&self, image_id: &str, ids: &[u32]) -> Vec<Vec<String>> {
        let own = || vec![self.vocab.strip_reserved(ids)];
        let Some(lookup) = self.references else { return own() };

        let captions = lookup.references(image_id);
        if captions.is_empty() {
            tracing::warn!("No reference captions for '{}', using its own", image_id);
            return own();
        }
        captions.iter().map(|c| Vocabulary::tokenize(c)).collect()
    }
}
