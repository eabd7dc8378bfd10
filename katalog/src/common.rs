use shared_types::StorageError;

#[derive(Debug)]
pub enum CatalogError {
    IoError(std::io::Error),
    SerializationError(bincode::error::EncodeError),
    DeserializationError(bincode::error::DecodeError),
    StorageError(StorageError),
    IndexExists(String),
    IndexNotFound(String),
    FileInUse(String),
    InvalidKey(String),
}

impl From<std::io::Error> for CatalogError {
    fn from(error: std::io::Error) -> Self {
        CatalogError::IoError(error)
    }
}

impl From<bincode::error::EncodeError> for CatalogError {
    fn from(error: bincode::error::EncodeError) -> Self {
        CatalogError::SerializationError(error)
    }
}

impl From<bincode::error::DecodeError> for CatalogError {
    fn from(error: bincode::error::DecodeError) -> Self {
        CatalogError::DeserializationError(error)
    }
}

impl From<StorageError> for CatalogError {
    fn from(error: StorageError) -> Self {
        CatalogError::StorageError(error)
    }
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogError::IoError(e) => write!(f, "IO error: {}", e),
            CatalogError::SerializationError(e) => write!(f, "Serialization error: {}", e),
            CatalogError::DeserializationError(e) => write!(f, "Deserialization error: {}", e),
            CatalogError::StorageError(e) => write!(f, "Index error: {}", e),
            CatalogError::IndexExists(name) => write!(f, "Index '{}' already exists", name),
            CatalogError::IndexNotFound(name) => write!(f, "Index '{}' not found", name),
            CatalogError::FileInUse(file) => {
                write!(f, "File '{}' already backs another index", file)
            }
            CatalogError::InvalidKey(msg) => write!(f, "Invalid key: {}", msg),
        }
    }
}

impl std::error::Error for CatalogError {}
