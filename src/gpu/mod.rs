//! wgpu-backed implementations of the capture backend traits

pub mod readback;

pub use readback::WgpuReadback;
