// ============================================================
// Layer 5 — Image Encoders
// ============================================================
// A convolutional backbone turns pixels into a grid of feature
// vectors. Its only contract with the rest of the crate is the
// output shape:
//
//   images [b, 3, H, W]  →  backbone  →  [b, encoder_dim, g, g]
//
// H and W are free: adaptive average pooling always lands on a
// g×g grid, whatever the input resolution.
//
// Two heads sit on top:
//
//   GlobalEncoder  (g = 1)   → Linear → ReLU → Dropout(0.5)
//                              one [b, embed_size] vector per image
//
//   SpatialEncoder (g = 7)   → [b, g*g, encoder_dim]
//                              one vector per region, for attention
//
// Fine-tuning is on by default: the backbone starts from random
// weights and no pretrained import exists, so a frozen backbone
// would only ever hand the decoder fixed random features. With
// fine-tuning off the backbone output is detached, so gradients
// stop at the heads and only they (and the decoder) learn.

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        Dropout, DropoutConfig,
        Linear, LinearConfig,
        PaddingConfig2d,
    },
    prelude::*,
    tensor::activation::relu,
};

/// Output channels of the intermediate conv layers.
const STEM_CHANNELS: [usize; 3] = [32, 64, 128];

// ─── ConvBackbone ─────────────────────────────────────────────────────────────
#[derive(Config, Debug)]
pub struct ConvBackboneConfig {
    pub encoder_dim: usize,
    pub grid_size:   usize,
}

impl ConvBackboneConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ConvBackbone<B> {
        let mut channels = vec![3];
        channels.extend(STEM_CHANNELS);
        channels.push(self.encoder_dim);

        let convs = channels
            .windows(2)
            .map(|pair| {
                Conv2dConfig::new([pair[0], pair[1]], [3, 3])
                    .with_stride([2, 2])
                    .with_padding(PaddingConfig2d::Explicit(1, 1))
                    .init(device)
            })
            .collect();

        ConvBackbone {
            convs,
            pool: AdaptiveAvgPool2dConfig::new([self.grid_size, self.grid_size]).init(),
        }
    }
}

#[derive(Module, Debug)]
pub struct ConvBackbone<B: Backend> {
    pub convs: Vec<Conv2d<B>>,
    pub pool:  AdaptiveAvgPool2d,
}

impl<B: Backend> ConvBackbone<B> {
    /// [b, 3, H, W] → [b, encoder_dim, g, g]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = images;
        for conv in &self.convs {
            x = relu(conv.forward(x));
        }
        self.pool.forward(x)
    }
}

// ─── GlobalEncoder ────────────────────────────────────────────────────────────
#[derive(Config, Debug)]
pub struct GlobalEncoderConfig {
    pub encoder_dim:   usize,
    pub embed_size:    usize,
    #[config(default = true)]
    pub train_encoder: bool,
    #[config(default = 0.5)]
    pub dropout:       f64,
}

impl GlobalEncoderConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> GlobalEncoder<B> {
        GlobalEncoder {
            backbone:      ConvBackboneConfig::new(self.encoder_dim, 1).init(device),
            fc:            LinearConfig::new(self.encoder_dim, self.embed_size).init(device),
            dropout:       DropoutConfig::new(self.dropout).init(),
            train_encoder: self.train_encoder,
        }
    }
}

#[derive(Module, Debug)]
pub struct GlobalEncoder<B: Backend> {
    pub backbone:      ConvBackbone<B>,
    pub fc:            Linear<B>,
    pub dropout:       Dropout,
    pub train_encoder: bool,
}

impl<B: Backend> GlobalEncoder<B> {
    /// [b, 3, H, W] → [b, embed_size]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let features = self.backbone.forward(images);
        let features = if self.train_encoder { features } else { features.detach() };
        let [batch, channels, _, _] = features.dims();

        let pooled = features.reshape([batch, channels]);
        self.dropout.forward(relu(self.fc.forward(pooled)))
    }
}

// ─── SpatialEncoder ───────────────────────────────────────────────────────────
#[derive(Config, Debug)]
pub struct SpatialEncoderConfig {
    pub encoder_dim:   usize,
    #[config(default = 7)]
    pub grid_size:     usize,
    #[config(default = true)]
    pub train_encoder: bool,
}

impl SpatialEncoderConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> SpatialEncoder<B> {
        SpatialEncoder {
            backbone:      ConvBackboneConfig::new(self.encoder_dim, self.grid_size).init(device),
            train_encoder: self.train_encoder,
        }
    }
}

#[derive(Module, Debug)]
pub struct SpatialEncoder<B: Backend> {
    pub backbone:      ConvBackbone<B>,
    pub train_encoder: bool,
}

impl<B: Backend> SpatialEncoder<B> {
    /// [b, 3, H, W] → [b, g*g, encoder_dim]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 3> {
        let features = self.backbone.forward(images);
        let features = if self.train_encoder { features } else { features.detach() };
        let [batch, channels, gh, gw] = features.dims();

        features
            .reshape([batch, channels, gh * gw])
            .swap_dims(1, 2)
    }
}
