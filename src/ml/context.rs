// ============================================================
// Layer 5 — Execution Context
// ============================================================
// Device and seed travel together as one explicit value, never
// as globals. Creating a context seeds the backend RNG, so all
// weight initialisation and dropout masks drawn afterwards are
// reproducible.

use burn::prelude::*;

#[derive(Debug, Clone)]
pub struct ExecutionContext<B: Backend> {
    pub device: B::Device,
    pub seed:   u64,
}

impl<B: Backend> ExecutionContext<B> {
    pub fn new(device: B::Device, seed: u64) -> Self {
        B::seed(seed);
        Self { device, seed }
    }
}
