// ============================================================
// Layer 2 — Compute Device
// ============================================================
// Which Burn backend a use case runs on:
//
//   wgpu → burn::backend::Wgpu     (GPU through WebGPU)
//   cpu  → burn::backend::NdArray  (portable, no GPU needed)
//
// Training wraps either in Autodiff. Use cases turn this value
// into a concrete backend type with one `match` and then call a
// generic function; nothing below this layer knows which one
// was chosen.

use std::fmt;

use serde::{Deserialize, Serialize};

pub type WgpuBackend = burn::backend::Wgpu;
pub type CpuBackend  = burn::backend::NdArray;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputeDevice {
    #[default]
    Wgpu,
    Cpu,
}

impl ComputeDevice {
    pub fn wgpu() -> burn::backend::wgpu::WgpuDevice {
        burn::backend::wgpu::WgpuDevice::default()
    }

    pub fn cpu() -> burn::backend::ndarray::NdArrayDevice {
        burn::backend::ndarray::NdArrayDevice::Cpu
    }
}

impl fmt::Display for ComputeDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wgpu => write!(f, "wgpu"),
            Self::Cpu  => write!(f, "cpu"),
        }
    }
}
