use burn::backend::Autodiff;

#[cfg(not(feature = "tch"))]
mod selected {
	use burn::backend::ndarray::NdArrayDevice;

	pub type ServeBackend = burn::backend::NdArray;

	pub fn device() -> NdArrayDevice {
		NdArrayDevice::Cpu
	}
}

#[cfg(feature = "tch")]
mod selected {
	use burn_tch::{LibTorch, LibTorchDevice};

	pub type ServeBackend = LibTorch;

	pub fn device() -> LibTorchDevice {
		if tch::utils::has_cuda() {
			LibTorchDevice::Cuda(0)
		} else {
			log::warn!("No CUDA configuration detected, running LibTorch on the CPU");
			LibTorchDevice::Cpu
		}
	}
}

pub use selected::{device, ServeBackend};

pub type TrainBackend = Autodiff<ServeBackend>;
