//! Raw RandomX C API and owning handles.
//!
//! The library itself is built and linked by `randomx-rs`; its safe wrappers
//! do not expose partial dataset initialization, so the engine talks to the C
//! API directly through these handles.

use std::os::raw::{c_ulong, c_void};
use std::ptr::NonNull;

use randomx_rs::RandomXFlag;

#[allow(non_camel_case_types)]
#[repr(C)]
pub struct randomx_cache {
    _private: [u8; 0],
}

#[allow(non_camel_case_types)]
#[repr(C)]
pub struct randomx_dataset {
    _private: [u8; 0],
}

#[allow(non_camel_case_types)]
#[repr(C)]
pub struct randomx_vm {
    _private: [u8; 0],
}

extern "C" {
    fn randomx_alloc_cache(flags: u32) -> *mut randomx_cache;
    fn randomx_init_cache(cache: *mut randomx_cache, key: *const c_void, key_size: usize);
    fn randomx_release_cache(cache: *mut randomx_cache);

    fn randomx_alloc_dataset(flags: u32) -> *mut randomx_dataset;
    fn randomx_dataset_item_count() -> c_ulong;
    fn randomx_init_dataset(
        dataset: *mut randomx_dataset,
        cache: *mut randomx_cache,
        start_item: c_ulong,
        item_count: c_ulong,
    );
    fn randomx_release_dataset(dataset: *mut randomx_dataset);

    fn randomx_create_vm(
        flags: u32,
        cache: *mut randomx_cache,
        dataset: *mut randomx_dataset,
    ) -> *mut randomx_vm;
    fn randomx_destroy_vm(vm: *mut randomx_vm);
    fn randomx_calculate_hash(
        vm: *mut randomx_vm,
        input: *const c_void,
        input_size: usize,
        output: *mut c_void,
    );
}

/// Raw pointer that may cross into dataset-init worker threads.
#[derive(Clone, Copy)]
struct SendPtr<T>(*mut T);

unsafe impl<T> Send for SendPtr<T> {}
unsafe impl<T> Sync for SendPtr<T> {}

impl<T> SendPtr<T> {
    // Method access keeps closures capturing the wrapper, not the bare pointer.
    fn get(self) -> *mut T {
        self.0
    }
}

/// Argon2-derived cache (~256 MB).
pub struct Cache {
    ptr: NonNull<randomx_cache>,
}

// The cache is read-only once `init` has run; RandomX allows sharing it.
unsafe impl Send for Cache {}
unsafe impl Sync for Cache {}

impl Cache {
    pub fn alloc(flags: RandomXFlag) -> Option<Self> {
        let ptr = unsafe { randomx_alloc_cache(flags.bits()) };
        NonNull::new(ptr).map(|ptr| Self { ptr })
    }

    pub fn init(&mut self, key: &[u8]) {
        unsafe { randomx_init_cache(self.ptr.as_ptr(), key.as_ptr().cast(), key.len()) }
    }

    fn as_ptr(&self) -> *mut randomx_cache {
        self.ptr.as_ptr()
    }
}

impl Drop for Cache {
    fn drop(&mut self) {
        unsafe { randomx_release_cache(self.ptr.as_ptr()) }
    }
}

/// Full-memory dataset (~2 GB).
pub struct Dataset {
    ptr: NonNull<randomx_dataset>,
}

unsafe impl Send for Dataset {}
unsafe impl Sync for Dataset {}

impl Dataset {
    pub fn alloc(flags: RandomXFlag) -> Option<Self> {
        let ptr = unsafe { randomx_alloc_dataset(flags.bits()) };
        NonNull::new(ptr).map(|ptr| Self { ptr })
    }

    pub fn item_count() -> u64 {
        unsafe { randomx_dataset_item_count() as u64 }
    }

    /// Fill the dataset from `cache`, splitting the item range into at most
    /// `threads` disjoint chunks.
    pub fn init(&mut self, cache: &Cache, threads: usize) {
        let total = Self::item_count();
        let threads = threads.max(1) as u64;

        if threads == 1 {
            unsafe {
                randomx_init_dataset(self.ptr.as_ptr(), cache.as_ptr(), 0, total as c_ulong)
            };
            return;
        }

        let chunk = (total + threads - 1) / threads;
        let dataset = SendPtr(self.ptr.as_ptr());
        let cache = SendPtr(cache.as_ptr());

        std::thread::scope(|scope| {
            for t in 0..threads {
                let start = t * chunk;
                if start >= total {
                    break;
                }
                let count = chunk.min(total - start);
                // Ranges are disjoint, so the workers never write the same item.
                scope.spawn(move || unsafe {
                    randomx_init_dataset(
                        dataset.get(),
                        cache.get(),
                        start as c_ulong,
                        count as c_ulong,
                    )
                });
            }
        });
    }

    fn as_ptr(&self) -> *mut randomx_dataset {
        self.ptr.as_ptr()
    }
}

impl Drop for Dataset {
    fn drop(&mut self) {
        unsafe { randomx_release_dataset(self.ptr.as_ptr()) }
    }
}

/// One RandomX virtual machine. Not reentrant: callers serialize access.
///
/// Holds raw pointers into the cache/dataset it was created with, so its
/// owner must drop it before them.
pub struct Vm {
    ptr: NonNull<randomx_vm>,
}

unsafe impl Send for Vm {}

impl Vm {
    pub fn create(flags: RandomXFlag, cache: &Cache, dataset: Option<&Dataset>) -> Option<Self> {
        let dataset_ptr = dataset.map_or(std::ptr::null_mut(), Dataset::as_ptr);
        let ptr = unsafe { randomx_create_vm(flags.bits(), cache.as_ptr(), dataset_ptr) };
        NonNull::new(ptr).map(|ptr| Self { ptr })
    }

    pub fn calculate_hash(&mut self, input: &[u8]) -> [u8; 32] {
        let mut output = [0u8; 32];
        unsafe {
            randomx_calculate_hash(
                self.ptr.as_ptr(),
                input.as_ptr().cast(),
                input.len(),
                output.as_mut_ptr().cast(),
            )
        };
        output
    }
}

impl Drop for Vm {
    fn drop(&mut self) {
        unsafe { randomx_destroy_vm(self.ptr.as_ptr()) }
    }
}
