use h3o::Resolution;
use thiserror::Error;

/// Structural failures that abort a pipeline run.
///
/// Geometry-level problems (degenerate squares, unparsable keys) are not
/// errors at this level: the matrix builder skips and counts them.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid coordinate: lat={lat}, lon={lon}")]
    InvalidCoordinate { lat: f64, lon: f64 },

    #[error("weight matrix built at resolution {found:?}, expected {expected:?}")]
    ResolutionMismatch { expected: Resolution, found: Resolution },

    #[error("weight matrix artifact is incomplete: {0}")]
    MatrixIncomplete(String),

    #[error("empty result at stage `{0}`")]
    EmptyResult(&'static str),
}
