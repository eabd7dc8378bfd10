//! Error types shared across the index crates

#[derive(Debug)]
pub enum StorageError {
    CorruptedData(String),
    InvalidData(String),
    IoError(String),
    InvalidInput(String),
    StructuralInconsistency(String),
    Unsupported(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::CorruptedData(msg) => write!(f, "Corrupted data: {}", msg),
            StorageError::InvalidData(msg) => write!(f, "Invalid data: {}", msg),
            StorageError::IoError(msg) => write!(f, "IO error: {}", msg),
            StorageError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            StorageError::StructuralInconsistency(msg) => {
                write!(f, "Structural inconsistency: {}", msg)
            }
            StorageError::Unsupported(msg) => write!(f, "Unsupported operation: {}", msg),
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::IoError(err.to_string())
    }
}

impl std::error::Error for StorageError {}
