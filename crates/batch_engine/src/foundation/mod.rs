//! Foundation module - Core utilities and types
//!
//! This module provides fundamental utilities used throughout the engine:
//! - Identity types and the id-issuing service
//! - Logging utilities

pub mod ids;
pub mod logging;
