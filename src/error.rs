use thiserror::Error;

// Unified error type for sparlu

#[derive(Error, Debug)]
pub enum SluError {
    #[error("host allocation failure: {0}")]
    Allocation(String),
    #[error("singular diagonal block in supernode {supernode}")]
    SingularPivot { supernode: usize },
    #[error("insufficient accelerator memory: required {required} bytes, available {available} bytes")]
    DeviceMemory { required: usize, available: usize },
    #[error("malformed input: {0}")]
    UnsupportedFormat(String),
    #[error("process grid mismatch: {0}")]
    GridMismatch(String),
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
}
