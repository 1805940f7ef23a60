// ============================================================
// Layer 5 — Decoding: Teacher Forcing, Loss, Greedy Generation
// ============================================================
// Written once against the Captioner trait, shared by both models.
//
// Teacher forcing (training):
//   Feed the GROUND-TRUTH token at every step, whatever the model
//   predicted the step before. With a caption of T tokens:
//
//     inputs  = captions[:, 0 .. T-1]
//     logits  = priming row (if any) + one row per input
//     targets = the last n caption columns, n = number of rows
//
//   ShowTell:        n = T    (priming row predicts <sos>)
//   ShowAttendTell:  n = T-1  (row s predicts token s+1)
//
// Masked loss:
//   Cross-entropy per position, <pad> targets weighted 0, averaged
//   over the real tokens only. Padding never pulls the model
//   towards predicting <pad>.
//
// Greedy generation (inference):
//   Each row of the batch runs a small state machine:
//
//     Start ──feed <sos>──▶ Generating ──argmax == <eos>──▶ Done(EndToken)
//                               │
//                               └── max_len steps used ──▶ Done(StepCap)
//
//   The loop runs at most max_len steps, so an output holds at
//   most max_len + 1 ids (the leading <sos> included). Hitting
//   the cap is a normal, truncated result.
//
// Reference: Williams & Zipser (1989) teacher forcing

use anyhow::{anyhow, bail, Result};
use burn::{
    prelude::*,
    tensor::{activation::log_softmax, TensorData},
};

use crate::domain::vocabulary::{END_ID, PAD_ID, START_ID};
use crate::ml::model::Captioner;

// ─── Teacher Forcing ──────────────────────────────────────────────────────────
pub struct TeacherForced<B: Backend> {
    /// [b, n, vocab]
    pub logits:    Tensor<B, 3>,
    /// [b, n], aligned with `logits`
    pub targets:   Tensor<B, 2, Int>,
    /// [b, n, P] for attention models
    pub attention: Option<Tensor<B, 3>>,
}

pub fn teacher_forced<B, M>(
    model:    &M,
    images:   Tensor<B, 4>,
    captions: Tensor<B, 2, Int>,
) -> Result<TeacherForced<B>>
where
    B: Backend,
    M: Captioner<B>,
{
    let [batch, seq_len] = captions.dims();
    if seq_len < 2 {
        bail!("captions need at least <sos> and <eos>, got {seq_len} columns");
    }

    let features = model.encode(images);
    let primed   = model.prime(&features);

    let mut rows   = Vec::with_capacity(seq_len);
    let mut alphas = Vec::with_capacity(seq_len);
    rows.extend(primed.logits);

    let mut state = primed.state;
    for t in 0..seq_len - 1 {
        let tokens = captions.clone().slice([0..batch, t..t + 1]).reshape([batch]);
        let step = model.decode_step(&features, state, tokens);
        rows.push(step.logits);
        alphas.extend(step.attention);
        state = step.state;
    }

    let n = rows.len();
    let logits    = Tensor::stack::<3>(rows, 1);
    let targets   = captions.slice([0..batch, seq_len - n..seq_len]);
    let attention = (!alphas.is_empty()).then(|| Tensor::stack::<3>(alphas, 1));

    Ok(TeacherForced { logits, targets, attention })
}

/// Mean cross-entropy over non-<pad> targets. Returns a 1-element tensor.
pub fn caption_loss<B: Backend>(logits: Tensor<B, 3>, targets: Tensor<B, 2, Int>) -> Tensor<B, 1> {
    let [batch, steps, _] = logits.dims();

    let log_probs = log_softmax(logits, 2);
    let picked = log_probs
        .gather(2, targets.clone().unsqueeze_dim::<3>(2))
        .reshape([batch, steps]);

    let mask  = targets.not_equal_elem(PAD_ID as i64).float();
    let count = mask.clone().sum().clamp_min(1.0);

    (picked * mask).sum().neg() / count
}

// ─── Greedy Generation ────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The model produced <eos>
    EndToken,
    /// max_len steps ran out first
    StepCap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GenerationState {
    Start,
    Generating,
    Done(Termination),
}

/// One generated caption.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    /// <sos> first, <eos> last when terminated by EndToken
    pub tokens:      Vec<u32>,
    /// One row of attention weights per generated token
    pub attention:   Vec<Vec<f32>>,
    pub termination: Termination,
}

/// Greedy decode a whole batch of images. Run this on a model
/// without autodiff (`model.valid()`), where dropout is inactive.
pub fn generate<B, M>(model: &M, images: Tensor<B, 4>, max_len: usize) -> Result<Vec<Generation>>
where
    B: Backend,
    M: Captioner<B>,
{
    let [batch, _, _, _] = images.dims();
    let device = images.device();

    let features = model.encode(images);
    let mut state = model.prime(&features).state;

    let mut states = vec![GenerationState::Start; batch];
    let mut out: Vec<Generation> = (0..batch)
        .map(|_| Generation {
            tokens:      Vec::with_capacity(max_len + 1),
            attention:   Vec::new(),
            termination: Termination::StepCap,
        })
        .collect();

    let mut input = vec![START_ID as i64; batch];
    for (row, st) in out.iter_mut().zip(states.iter_mut()) {
        row.tokens.push(START_ID);
        *st = GenerationState::Generating;
    }

    for _ in 0..max_len {
        let tokens = Tensor::<B, 1, Int>::from_data(TensorData::new(input.clone(), [batch]), &device);
        let step = model.decode_step(&features, state, tokens);
        state = step.state;

        let predicted = step.logits
            .argmax(1)
            .reshape([batch])
            .into_data()
            .convert::<i64>()
            .to_vec::<i64>()
            .map_err(|e| anyhow!("Cannot read predictions: {e:?}"))?;

        let alphas = match step.attention {
            Some(a) => {
                let [_, positions] = a.dims();
                let flat = a
                    .into_data()
                    .convert::<f32>()
                    .to_vec::<f32>()
                    .map_err(|e| anyhow!("Cannot read attention weights: {e:?}"))?;
                Some((flat, positions))
            }
            None => None,
        };

        for (i, (row, st)) in out.iter_mut().zip(states.iter_mut()).enumerate() {
            if *st != GenerationState::Generating {
                continue;
            }
            let token = predicted[i] as u32;
            row.tokens.push(token);
            if let Some((flat, positions)) = &alphas {
                row.attention.push(flat[i * positions..(i + 1) * positions].to_vec());
            }
            if token == END_ID {
                *st = GenerationState::Done(Termination::EndToken);
            }
        }

        if states.iter().all(|s| matches!(s, GenerationState::Done(_))) {
            break;
        }
        input = predicted;
    }

    for (row, st) in out.iter_mut().zip(states) {
        row.termination = match st {
            GenerationState::Done(t) => t,
            GenerationState::Start | GenerationState::Generating => Termination::StepCap,
        };
    }
    Ok(out)
}
