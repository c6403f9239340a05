//! sparlu: distributed-memory supernodal sparse LU factorization
//!
//! This crate provides the factorization engine for block-sparse LU on a 2D
//! process grid: compressed block panels, the diagonal-factor /
//! panel-broadcast / Schur-update pipeline with look-ahead, and the
//! accelerator memory planner that mirrors panel data into one arena
//! allocation with per-lane scratch.

pub mod parallel;

pub mod accel;
pub mod config;
pub mod engine;
pub mod error;
pub mod matrix;
pub mod panel;

// Re-exports for convenience
pub use accel::*;
pub use config::*;
pub use engine::*;
pub use error::*;
pub use matrix::*;
pub use panel::*;

// Re-export the engine entry point at the crate root
pub use engine::LuEngine;
