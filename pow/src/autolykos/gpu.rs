//! Host-side OpenCL dispatcher for [`AUTOLYKOS_KERNEL`](super::AUTOLYKOS_KERNEL).
//!
//! Built with the `gpu` feature; otherwise a stub whose constructor fails.

use crate::config::GpuConfig;
use crate::error::{PowError, Result};

#[cfg(feature = "gpu")]
use opencl3::command_queue::{CommandQueue, CL_BLOCKING};
#[cfg(feature = "gpu")]
use opencl3::context::Context as ClContext;
#[cfg(feature = "gpu")]
use opencl3::device::{get_all_devices, Device, CL_DEVICE_TYPE_GPU};
#[cfg(feature = "gpu")]
use opencl3::kernel::{ExecuteKernel, Kernel};
#[cfg(feature = "gpu")]
use opencl3::memory::{Buffer, CL_MEM_READ_ONLY, CL_MEM_WRITE_ONLY};
#[cfg(feature = "gpu")]
use opencl3::program::Program;
#[cfg(feature = "gpu")]
use opencl3::types::{cl_uchar, cl_uint};
#[cfg(feature = "gpu")]
use parking_lot::Mutex;

#[cfg(feature = "gpu")]
use super::{get_kernel_source, K_HASH_BYTES, K_MAX_INPUT_BYTES, KERNEL_NAME};

#[cfg(feature = "gpu")]
fn gpu_err(context: &str) -> impl Fn(opencl3::error_codes::ClError) -> PowError + '_ {
    move |e| PowError::Gpu(format!("{context}: {e}"))
}

/// OpenCL Autolykos hasher bound to one GPU.
#[cfg(feature = "gpu")]
pub struct AutolykosGpu {
    config: GpuConfig,
    device_name: String,
    context: ClContext,
    queue: CommandQueue,
    _program: Program,
    // Kernel args are per-kernel state, so dispatches are serialized.
    kernel: Mutex<Kernel>,
}

#[cfg(feature = "gpu")]
impl AutolykosGpu {
    pub fn new(config: GpuConfig) -> Result<Self> {
        config.validate()?;

        let device_ids = get_all_devices(CL_DEVICE_TYPE_GPU).map_err(gpu_err("failed to get GPU devices"))?;
        if device_ids.is_empty() {
            return Err(PowError::Gpu("no GPU devices found".into()));
        }
        let device_id = *device_ids.get(config.device_id).ok_or_else(|| {
            PowError::Gpu(format!(
                "invalid device ID {}. Available: 0-{}",
                config.device_id,
                device_ids.len() - 1
            ))
        })?;

        let device = Device::new(device_id);
        let device_name = device.name().unwrap_or_default();
        log::info!("Using GPU: {} (ID: {})", device_name, config.device_id);

        let context = ClContext::from_device(&device).map_err(gpu_err("failed to create OpenCL context"))?;
        let queue = CommandQueue::create_default_with_properties(&context, 0, 0)
            .map_err(gpu_err("failed to create command queue"))?;

        let program = Program::create_and_build_from_source(&context, get_kernel_source(), "")
            .map_err(|e| PowError::Gpu(format!("failed to build OpenCL program: {e}")))?;
        let kernel = Kernel::create(&program, KERNEL_NAME).map_err(gpu_err("failed to create kernel"))?;

        Ok(Self {
            config,
            device_name,
            context,
            queue,
            _program: program,
            kernel: Mutex::new(kernel),
        })
    }

    /// Names of the visible GPU devices, in device-ID order.
    pub fn list_devices() -> Result<Vec<String>> {
        let device_ids = get_all_devices(CL_DEVICE_TYPE_GPU).map_err(gpu_err("failed to get GPU devices"))?;
        Ok(device_ids
            .into_iter()
            .map(|id| Device::new(id).name().unwrap_or_default())
            .collect())
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// One 32-byte hash per nonce, in nonce order. The input is uploaded
    /// once; nonces go to the device in dispatches of at most `batch_size`.
    pub fn hash_batch(&self, input: &[u8], nonces: &[u32]) -> Result<Vec<[u8; K_HASH_BYTES]>> {
        if input.len() > K_MAX_INPUT_BYTES {
            return Err(PowError::InputTooLarge {
                len: input.len(),
                max: K_MAX_INPUT_BYTES,
            });
        }
        if nonces.is_empty() {
            return Ok(Vec::new());
        }

        // zero-sized buffers are invalid, keep at least one byte
        let mut input_host = input.to_vec();
        if input_host.is_empty() {
            input_host.push(0);
        }

        let mut input_buffer = unsafe {
            Buffer::<cl_uchar>::create(&self.context, CL_MEM_READ_ONLY, input_host.len(), std::ptr::null_mut())
                .map_err(gpu_err("failed to create input buffer"))?
        };
        unsafe {
            self.queue
                .enqueue_write_buffer(&mut input_buffer, CL_BLOCKING, 0, &input_host, &[])
                .map_err(gpu_err("failed to upload input"))?;
        }

        let batch = self.config.batch_size.max(1);
        let mut hashes = Vec::with_capacity(nonces.len());
        for chunk in nonces.chunks(batch) {
            self.dispatch(&input_buffer, input.len() as cl_uint, chunk, &mut hashes)?;
        }
        Ok(hashes)
    }

    /// Run the kernel over one chunk of nonces and append the results.
    fn dispatch(
        &self,
        input_buffer: &Buffer<cl_uchar>,
        input_len: cl_uint,
        nonces: &[u32],
        hashes: &mut Vec<[u8; K_HASH_BYTES]>,
    ) -> Result<()> {
        let count = nonces.len();
        let mut nonce_buffer = unsafe {
            Buffer::<cl_uint>::create(&self.context, CL_MEM_READ_ONLY, count, std::ptr::null_mut())
                .map_err(gpu_err("failed to create nonce buffer"))?
        };
        let output_buffer = unsafe {
            Buffer::<cl_uchar>::create(&self.context, CL_MEM_WRITE_ONLY, count * K_HASH_BYTES, std::ptr::null_mut())
                .map_err(gpu_err("failed to create output buffer"))?
        };

        unsafe {
            self.queue
                .enqueue_write_buffer(&mut nonce_buffer, CL_BLOCKING, 0, nonces, &[])
                .map_err(gpu_err("failed to upload nonces"))?;
        }

        let count_arg = count as cl_uint;
        let local = self.config.work_group_size;
        let global = if local == 0 { count } else { count.div_ceil(local) * local };

        {
            let kernel = self.kernel.lock();
            let mut exec = ExecuteKernel::new(&kernel);
            unsafe {
                exec.set_arg(input_buffer)
                    .set_arg(&input_len)
                    .set_arg(&nonce_buffer)
                    .set_arg(&output_buffer)
                    .set_arg(&count_arg)
                    .set_global_work_size(global);
            }
            if local != 0 {
                exec.set_local_work_size(local);
            }
            unsafe {
                exec.enqueue_nd_range(&self.queue)
                    .map_err(gpu_err("failed to enqueue kernel"))?;
            }
            self.queue.finish().map_err(gpu_err("kernel execution failed"))?;
        }

        let mut output = vec![0u8; count * K_HASH_BYTES];
        unsafe {
            self.queue
                .enqueue_read_buffer(&output_buffer, CL_BLOCKING, 0, &mut output, &[])
                .map_err(gpu_err("failed to read output"))?;
        }

        hashes.extend(output.chunks_exact(K_HASH_BYTES).map(|chunk| {
            let mut hash = [0u8; K_HASH_BYTES];
            hash.copy_from_slice(chunk);
            hash
        }));
        Ok(())
    }

    pub fn hash_single(&self, input: &[u8], nonce: u32) -> Result<[u8; K_HASH_BYTES]> {
        self.hash_batch(input, &[nonce])?
            .pop()
            .ok_or_else(|| PowError::Gpu("kernel returned no output".into()))
    }
}

/// Stub for builds without the `gpu` feature.
#[cfg(not(feature = "gpu"))]
pub struct AutolykosGpu;

#[cfg(not(feature = "gpu"))]
fn not_compiled() -> PowError {
    PowError::Gpu("GPU support not compiled. Enable 'gpu' feature.".into())
}

#[cfg(not(feature = "gpu"))]
impl AutolykosGpu {
    pub fn new(_config: GpuConfig) -> Result<Self> {
        Err(not_compiled())
    }

    pub fn list_devices() -> Result<Vec<String>> {
        Err(not_compiled())
    }

    pub fn device_name(&self) -> &str {
        ""
    }

    pub fn hash_batch(&self, _input: &[u8], _nonces: &[u32]) -> Result<Vec<[u8; 32]>> {
        Err(not_compiled())
    }

    pub fn hash_single(&self, _input: &[u8], _nonce: u32) -> Result<[u8; 32]> {
        Err(not_compiled())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(not(feature = "gpu"))]
    #[test]
    fn test_stub_reports_missing_feature() {
        assert!(matches!(AutolykosGpu::new(GpuConfig::default()), Err(PowError::Gpu(_))));
        assert!(AutolykosGpu::list_devices().is_err());
    }

    // Runs only where an OpenCL GPU is present.
    #[cfg(feature = "gpu")]
    #[test]
    fn test_gpu_cpu_parity() {
        use crate::autolykos::autolykos_hash;

        let config = GpuConfig {
            batch_size: 256,
            work_group_size: 64,
            ..GpuConfig::default()
        };
        let gpu = match AutolykosGpu::new(config) {
            Ok(gpu) => gpu,
            Err(e) => {
                eprintln!("skipping GPU parity test: {e}");
                return;
            }
        };

        let single = gpu.hash_single(b"", 0).unwrap();
        assert_eq!(single, autolykos_hash(b"", 0).unwrap());

        let header: Vec<u8> = (0..192u16).map(|i| i as u8).collect();
        let nonces: Vec<u32> = (0..100).map(|i| i * 7919).collect();
        let batch = gpu.hash_batch(&header, &nonces).unwrap();
        for (hash, &nonce) in batch.iter().zip(nonces.iter()) {
            assert_eq!(*hash, autolykos_hash(&header, nonce).unwrap());
        }
    }

    #[cfg(feature = "gpu")]
    #[test]
    fn test_nonces_beyond_batch_size_are_split() {
        use crate::autolykos::autolykos_hash;

        let config = GpuConfig {
            batch_size: 64,
            work_group_size: 64,
            ..GpuConfig::default()
        };
        let gpu = match AutolykosGpu::new(config) {
            Ok(gpu) => gpu,
            Err(e) => {
                eprintln!("skipping GPU batch split test: {e}");
                return;
            }
        };

        // 3 full dispatches plus a 9-nonce tail
        let nonces: Vec<u32> = (0..201).collect();
        let batch = gpu.hash_batch(b"zion-header", &nonces).unwrap();
        assert_eq!(batch.len(), nonces.len());
        for (hash, &nonce) in batch.iter().zip(nonces.iter()) {
            assert_eq!(*hash, autolykos_hash(b"zion-header", nonce).unwrap(), "nonce {nonce}");
        }
    }
}
