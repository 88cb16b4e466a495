//! Foundation module - Core utilities and types
//!
//! This module provides fundamental utilities used throughout the engine:
//! - Math types and operations
//! - Bounding volumes and culling primitives
//! - Rays
//! - Logging utilities

pub mod math;
pub mod bounds;
pub mod ray;
pub mod logging;
