use serde::{Deserialize, Serialize};

/// Tensor backend a run executes on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// GPU through wgpu (Vulkan / Metal / DX12)
    #[default]
    Wgpu,
    /// Plain CPU
    NdArray,
}

pub type WgpuBackend    = burn::backend::Wgpu;
pub type NdArrayBackend = burn::backend::NdArray<f32>;

pub type WgpuTrainBackend    = burn::backend::Autodiff<WgpuBackend>;
pub type NdArrayTrainBackend = burn::backend::Autodiff<NdArrayBackend>;

pub fn wgpu_device() -> burn::backend::wgpu::WgpuDevice {
    burn::backend::wgpu::WgpuDevice::default()
}

pub fn ndarray_device() -> burn::backend::ndarray::NdArrayDevice {
    burn::backend::ndarray::NdArrayDevice::Cpu
}
