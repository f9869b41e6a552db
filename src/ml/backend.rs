use std::sync::OnceLock;

use burn::backend::Autodiff;
use burn::backend::ndarray::{NdArray, NdArrayDevice};
#[cfg(target_os = "macos")]
use burn::backend::wgpu::{self, WgpuDevice, graphics::Metal};
#[cfg(not(target_os = "macos"))]
use burn::backend::wgpu::{self, WgpuDevice, graphics::Vulkan};

pub type CpuDevice = NdArrayDevice;
pub type GpuDevice = WgpuDevice;

/// CPU training backend.
pub type CpuBackend = Autodiff<NdArray>;
/// GPU training backend.
pub type GpuBackend = Autodiff<wgpu::Wgpu>;

static WGPU_INIT: OnceLock<()> = OnceLock::new();

/// Select the graphics API for `device` once per process.
pub fn init_wgpu(device: &WgpuDevice) {
    WGPU_INIT.get_or_init(|| {
        tracing::info!("Initializing WGPU device {device:?}");
        #[cfg(target_os = "macos")]
        wgpu::init_setup::<Metal>(device, Default::default());
        #[cfg(not(target_os = "macos"))]
        wgpu::init_setup::<Vulkan>(device, Default::default());
    });
}

/// Route kernel compilation and autotune caches to the global cache directory.
pub fn init_cubecl_config() {
    static CUBECL_CONFIG: OnceLock<()> = OnceLock::new();
    CUBECL_CONFIG.get_or_init(|| {
        let mut config = cubecl_runtime::config::GlobalConfig::default();
        config.compilation.cache = Some(cubecl_runtime::config::cache::CacheConfig::Global);
        config.autotune.cache = cubecl_runtime::config::cache::CacheConfig::Global;
        let _ = std::panic::catch_unwind(|| cubecl_runtime::config::GlobalConfig::set(config));
    });
}

/// Default GPU device, ready for use.
pub fn gpu_device() -> GpuDevice {
    init_cubecl_config();
    let device = WgpuDevice::default();
    init_wgpu(&device);
    device
}

pub fn cpu_device() -> CpuDevice {
    NdArrayDevice::Cpu
}
