pub mod image_utils;
pub mod tokenizer_utils;

use anyhow::Result;
use candle_core::{
    utils::{cuda_is_available as candle_cuda_is_available, metal_is_available},
    DType, Device,
};

pub fn select_device(force_cpu: bool) -> Result<Device> {
    if force_cpu {
        Ok(Device::Cpu)
    } else if cuda_is_available() {
        Ok(Device::new_cuda(0)?)
    } else if metal_is_available() {
        Ok(Device::new_metal(0)?)
    } else {
        Ok(Device::Cpu)
    }
}

pub fn cuda_is_available() -> bool {
    candle_cuda_is_available()
}

/// Half precision only pays off on accelerators; CPU kernels always run in F32.
pub fn effective_dtype(requested: DType, device: &Device) -> DType {
    if device.is_cpu() {
        DType::F32
    } else {
        requested
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forced_cpu_is_cpu() -> Result<()> {
        let device = select_device(true)?;
        assert!(device.is_cpu());
        Ok(())
    }

    #[test]
    fn cpu_dtype_is_always_f32() {
        assert_eq!(effective_dtype(DType::BF16, &Device::Cpu), DType::F32);
        assert_eq!(effective_dtype(DType::F16, &Device::Cpu), DType::F32);
        assert_eq!(effective_dtype(DType::F32, &Device::Cpu), DType::F32);
    }
}
