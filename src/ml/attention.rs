// ============================================================
// Layer 5 — Soft (Additive) Attention
// ============================================================
// At every decoding step the decoder asks: which image regions
// matter for the next word?
//
//   features: [b, P, E]   P spatial positions, E channels each
//   hidden:   [b, D]      current decoder state
//
//   score[p] = A · tanh(U·features[p] + W·hidden)    [b, P]
//   alpha    = softmax(score) over positions         [b, P]
//   context  = Σ_p alpha[p] · features[p]            [b, E]
//
// alpha is a probability distribution per row (non-negative,
// sums to 1), and is what gets rendered as an attention heatmap.
//
// Reference: Bahdanau et al. (2015), Xu et al. (2015) Show, Attend and Tell

use burn::{
    nn::{Linear, LinearConfig},
    prelude::*,
    tensor::activation::softmax,
};

#[derive(Config, Debug)]
pub struct SoftAttentionConfig {
    pub encoder_dim:   usize,
    pub decoder_dim:   usize,
    pub attention_dim: usize,
}

impl SoftAttentionConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> SoftAttention<B> {
        SoftAttention {
            w: LinearConfig::new(self.decoder_dim, self.attention_dim).init(device),
            u: LinearConfig::new(self.encoder_dim, self.attention_dim).init(device),
            a: LinearConfig::new(self.attention_dim, 1).init(device),
        }
    }
}

#[derive(Module, Debug)]
pub struct SoftAttention<B: Backend> {
    /// Projects the decoder state
    pub w: Linear<B>,
    /// Projects each spatial feature
    pub u: Linear<B>,
    /// Collapses the joint projection to one score
    pub a: Linear<B>,
}

impl<B: Backend> SoftAttention<B> {
    /// Returns (alpha [b, P], context [b, E]).
    pub fn forward(&self, features: Tensor<B, 3>, hidden: Tensor<B, 2>) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let [batch, positions, _] = features.dims();

        let u_hs = self.u.forward(features.clone());                 // [b, P, A]
        let [_, _, att] = u_hs.dims();
        let w_ah = self.w.forward(hidden)                            // [b, A]
            .unsqueeze_dim::<3>(1)                                   // [b, 1, A]
            .expand([batch, positions, att]);

        let scores = self.a.forward((u_hs + w_ah).tanh())            // [b, P, 1]
            .squeeze::<2>(2);
        let alpha = softmax(scores, 1);                              // [b, P]

        // [b, 1, P] x [b, P, E] → [b, 1, E]
        let context = alpha.clone()
            .unsqueeze_dim::<3>(1)
            .matmul(features)
            .squeeze::<2>(1);

        (alpha, context)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray;

    fn check_rows_sum_to_one(batch: usize, positions: usize, enc: usize, dec: usize) {
        let device = Default::default();
        let attention = SoftAttentionConfig::new(enc, dec, 8).init::<TestBackend>(&device);
        let features = Tensor::<TestBackend, 3>::random(
            [batch, positions, enc], Distribution::Normal(0.0, 3.0), &device,
        );
        let hidden = Tensor::<TestBackend, 2>::random([batch, dec], Distribution::Normal(0.0, 3.0), &device);

        let (alpha, context) = attention.forward(features, hidden);
        assert_eq!(alpha.dims(), [batch, positions]);
        assert_eq!(context.dims(), [batch, enc]);

        let values = alpha.clone().into_data().convert::<f32>().to_vec::<f32>().unwrap();
        assert!(values.iter().all(|&v| v >= 0.0));

        let sums = alpha.sum_dim(1).into_data().convert::<f32>().to_vec::<f32>().unwrap();
        for s in sums {
            assert!((s - 1.0).abs() < 1e-5, "row sums to {s}");
        }
    }

    #[test]
    fn test_weights_sum_to_one_for_various_shapes() {
        check_rows_sum_to_one(1, 1, 4, 3);
        check_rows_sum_to_one(2, 49, 16, 12);
        check_rows_sum_to_one(5, 9, 3, 20);
    }

    #[test]
    fn test_context_is_convex_combination() {
        let device = Default::default();
        let attention = SoftAttentionConfig::new(2, 3, 4).init::<TestBackend>(&device);
        // Every position carries the same vector, so the context must equal it
        let features = Tensor::<TestBackend, 3>::ones([1, 6, 2], &device).mul_scalar(2.5);
        let hidden = Tensor::<TestBackend, 2>::zeros([1, 3], &device);
        let (_, context) = attention.forward(features, hidden);
        let values = context.into_data().convert::<f32>().to_vec::<f32>().unwrap();
        assert!(values.iter().all(|v| (v - 2.5).abs() < 1e-5));
    }
}
