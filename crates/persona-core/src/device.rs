use candle_core::Device;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::CoreResult;

/// Hardware placement for one model.
///
/// Each registry entry carries its own placement, so two models can sit on
/// different GPUs (or one on the GPU and one on the CPU).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    /// Try CUDA (or Metal) before the CPU.
    pub prefer_gpu: bool,
    /// CUDA ordinal. Ignored on Metal and CPU.
    pub cuda_device_id: usize,
}

impl Placement {
    pub const CPU: Placement = Placement { prefer_gpu: false, cuda_device_id: 0 };

    /// Same placement with `prefer_gpu` replaced when `force` is set.
    pub fn with_gpu_override(self, force: Option<bool>) -> Self {
        Self { prefer_gpu: force.unwrap_or(self.prefer_gpu), ..self }
    }

    /// Acquire the device this placement asks for.
    ///
    /// Unavailable accelerators fall back to the CPU with a warning.
    pub fn select(&self) -> CoreResult<Device> {
        if !self.prefer_gpu {
            return Ok(Device::Cpu);
        }

        #[cfg(feature = "cuda")]
        match Device::new_cuda(self.cuda_device_id) {
            Ok(dev) => {
                info!(cuda_device_id = self.cuda_device_id, "Placed on CUDA");
                return Ok(dev);
            }
            Err(e) => warn!(cuda_device_id = self.cuda_device_id, error = %e, "CUDA unavailable"),
        }

        #[cfg(feature = "metal")]
        match Device::new_metal(0) {
            Ok(dev) => {
                info!("Placed on Metal");
                return Ok(dev);
            }
            Err(e) => warn!(error = %e, "Metal unavailable"),
        }

        #[cfg(not(any(feature = "cuda", feature = "metal")))]
        warn!("GPU requested but built without `cuda` or `metal`");

        info!("Placed on CPU");
        Ok(Device::Cpu)
    }
}
