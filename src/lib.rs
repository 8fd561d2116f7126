#![doc = "Hexfuse public API"]
pub mod aggregate;
pub mod cli;
pub mod commands;
pub mod common;
pub mod config;
pub mod error;
pub mod hex;
pub mod matrix;
pub mod pipeline;
pub mod sources;

#[doc(inline)]
pub use aggregate::{aggregate, AggKind, Aggregation, ColumnSpec};

#[doc(inline)]
pub use error::PipelineError;

#[doc(inline)]
pub use hex::HEX_RESOLUTION;

#[doc(inline)]
pub use matrix::{get_or_build, MatrixBuildStats, MatrixBuilder, WeightMatrix};
