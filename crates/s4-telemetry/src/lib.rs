//! Logging primitives shared by the S4 operator and its tooling.
pub mod tracing;

pub use tracing::Tracing;
