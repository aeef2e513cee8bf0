//! qtx-optimizer
//!
//! Dynamic optimizer contract (C8): Gauss-Seidel coordinate descent on a
//! quadratic tracking-error objective with an L1 transaction-cost penalty.
//! Pure and deterministic: no logging, no IO.

mod engine;
mod types;

pub use engine::Optimizer;
pub use types::{Covariance, OptimizationResult};
