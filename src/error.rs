use thiserror::Error;

/// Typed failures of the training/inference pipeline. Everything is terminal
/// for a single-pass run; there are no retry semantics.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("malformed input in {file} (line {line}): {reason}")]
    MalformedInput {
        file: String,
        line: usize,
        reason: String,
    },

    #[error("inhibitor {inhibitor} has only {n} labeled specimen(s); at least 2 are required for leave-one-out cross-validation")]
    InsufficientSamples { inhibitor: String, n: usize },

    #[error("gene {gene} has zero variance across training specimens; standardization would divide by zero")]
    ZeroVarianceGene { gene: String },

    #[error("specimen {specimen} has an all-zero expression row; it cannot be normalized to unit norm")]
    ZeroExpressionRow { specimen: String },

    #[error("gene ordering mismatch between model tables: {reason}")]
    GeneOrderMismatch { reason: String },

    #[error("ridge system is not positive definite (diagonal {value:.6e} at row {row}); try a larger regularization strength")]
    NotPositiveDefinite { row: usize, value: f64 },

    #[error("dimension mismatch: {reason}")]
    DimensionMismatch { reason: String },
}
