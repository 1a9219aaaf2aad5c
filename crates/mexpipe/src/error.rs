use crate::types::ElementType;
use thiserror::Error;

/// Every way a pipeline call can fail before the pipeline runs.
///
/// At the C boundary all of these collapse to status -1 and the message is
/// printed through the error sink.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MarshalError {
    #[error("host API not found: {symbol}")]
    MissingSymbol { symbol: String },

    #[error("expected {expected} arguments for pipeline {pipeline}, got {actual}")]
    ArgumentCount {
        pipeline: String,
        expected: usize,
        actual: usize,
    },

    #[error("expected zero or one return value for pipeline {pipeline}, got {actual}")]
    ReturnCount { pipeline: String, actual: usize },

    #[error("complex argument not supported for parameter {parameter}")]
    Complex { parameter: String },

    #[error("expected scalar argument for parameter {parameter}")]
    ScalarShape { parameter: String },

    #[error("expected {expected} argument for scalar parameter {parameter}, got {actual}")]
    ScalarClass {
        parameter: String,
        expected: &'static str,
        actual: String,
    },

    #[error("expected type of class {expected} for argument {parameter}, got class {actual}")]
    BufferClass {
        parameter: String,
        expected: &'static str,
        actual: String,
    },

    #[error("expected array of rank {expected} for argument {parameter}, got array of rank {actual}")]
    Rank {
        parameter: String,
        expected: usize,
        actual: usize,
    },

    #[error("unsupported scalar type {ty}")]
    UnsupportedType { ty: ElementType },

    #[error("value {value} does not fit scalar type {ty}")]
    ScalarRange { value: String, ty: ElementType },

    #[error("array of class {class} cannot be read as a scalar")]
    ScalarSource { class: &'static str },

    #[error("buffer of rank {rank} exceeds the {max} dimensions of the pipeline buffer descriptor")]
    DescriptorRank { rank: usize, max: usize },

    #[error("extent or stride {value} does not fit the pipeline buffer descriptor")]
    DescriptorRange { value: usize },

    #[error("argument {index} is null")]
    NullArgument { index: usize },

    #[error("return slots requested but no return array was supplied")]
    NullReturnSlots,

    #[error("failed to allocate the status array")]
    Allocation,

    #[error("invalid pipeline metadata: {0}")]
    InvalidMetadata(String),

    #[error("{0}")]
    Library(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T, E = MarshalError> = std::result::Result<T, E>;
