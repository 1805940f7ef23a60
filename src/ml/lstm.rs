// ============================================================
// Layer 5 — LSTM Cell
// ============================================================
// One step of a single-layer LSTM. Both decoders drive the
// recurrence one token at a time (the attention decoder needs a
// fresh context vector before every step), so a cell is the
// natural unit rather than a whole-sequence layer.
//
//   z = W_x x + W_h h            (4 gates stacked, [b, 4H])
//   i = σ(z[0H..1H])   input gate
//   f = σ(z[1H..2H])   forget gate
//   g = tanh(z[2H..3H]) candidate
//   o = σ(z[3H..4H])   output gate
//   c' = f ⊙ c + i ⊙ g
//   h' = o ⊙ tanh(c')
//
// Reference: Hochreiter & Schmidhuber (1997)

use burn::{
    nn::{Linear, LinearConfig},
    prelude::*,
    tensor::activation::sigmoid,
};

#[derive(Config, Debug)]
pub struct LstmCellConfig {
    pub input_size:  usize,
    pub hidden_size: usize,
}

impl LstmCellConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> LstmCell<B> {
        LstmCell {
            input:       LinearConfig::new(self.input_size, 4 * self.hidden_size).init(device),
            hidden:      LinearConfig::new(self.hidden_size, 4 * self.hidden_size).init(device),
            hidden_size: self.hidden_size,
        }
    }
}

#[derive(Module, Debug)]
pub struct LstmCell<B: Backend> {
    pub input:       Linear<B>,
    pub hidden:      Linear<B>,
    pub hidden_size: usize,
}

/// Recurrent state, both [batch, hidden]
#[derive(Debug, Clone)]
pub struct LstmState<B: Backend> {
    pub hidden: Tensor<B, 2>,
    pub cell:   Tensor<B, 2>,
}

impl<B: Backend> LstmState<B> {
    pub fn zeros(batch: usize, hidden: usize, device: &B::Device) -> Self {
        Self {
            hidden: Tensor::zeros([batch, hidden], device),
            cell:   Tensor::zeros([batch, hidden], device),
        }
    }
}

impl<B: Backend> LstmCell<B> {
    /// x: [batch, input_size] → next state
    pub fn forward(&self, x: Tensor<B, 2>, state: LstmState<B>) -> LstmState<B> {
        let [batch, _] = x.dims();
        let h = self.hidden_size;

        let gates = self.input.forward(x) + self.hidden.forward(state.hidden);
        let gate  = |k: usize| gates.clone().slice([0..batch, k * h..(k + 1) * h]);

        let i = sigmoid(gate(0));
        let f = sigmoid(gate(1));
        let g = gate(2).tanh();
        let o = sigmoid(gate(3));

        let cell   = f * state.cell + i * g;
        let hidden = o * cell.clone().tanh();
        LstmState { hidden, cell }
    }
}
