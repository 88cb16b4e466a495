//! Backend implementations for the render module
//!
//! Only the recording headless backend ships with the crate; GPU backends
//! implement [`GpuBackend`](crate::render::api::GpuBackend) downstream.

pub mod headless;

pub use headless::{BackendCommand, HeadlessBackend};
