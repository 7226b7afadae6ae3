//! RandomX backend (feature `randomx`).

mod engine;
mod ffi;

pub use engine::{
    clamp_threads, dataset_init_threads, global, RandomXEngine, RandomXStatus, VERSION,
};
