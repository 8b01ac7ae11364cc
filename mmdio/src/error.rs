use thiserror::Error;

#[derive(Debug, Error)]
pub enum MmdError {
    #[error("index {index} is out of range (length {length})")]
    IndexOutOfRange { index: i32, length: usize },
    #[error("name `{name}` is not found")]
    NameNotFound { name: String },
    #[error("name `{name}` is already used by another element")]
    NameConflict { name: String },
    #[error("element {index} is named `{expected}` but the update carries `{actual}`")]
    NameMismatch {
        index: i32,
        expected: String,
        actual: String,
    },
    #[error("model copy failed: {cause}")]
    ModelCopyFailed { cause: Box<MmdError> },
    #[error("unexpected end of buffer")]
    UnexpectedEof,
    #[error("invalid signature {saw:?}")]
    InvalidSignature { saw: String },
    #[error("unsupported version {saw}")]
    UnsupportedVersion { saw: String },
    #[error("unknown text encoding {saw}")]
    UnknownEncoding { saw: u8 },
    #[error("unknown value {value} for {field}")]
    UnknownEnum { field: &'static str, value: i64 },
    #[error("decompression failed at block {block}: {reason}")]
    DecompressionFailed { block: usize, reason: String },
    #[error("parent bone `{parent}` not found (tried {candidates:?})")]
    ParentNotFound {
        parent: String,
        candidates: Vec<String>,
    },
    #[error("{entity}[{index}].{field}: {cause}")]
    Corrupted {
        entity: &'static str,
        index: usize,
        field: &'static str,
        #[source]
        cause: Box<MmdError>,
    },
    #[error("expected {expected} but found {found}")]
    UnexpectedToken {
        expected: &'static str,
        found: String,
    },
    #[error("text `{text}` cannot be encoded")]
    EncodeFailed { text: String },
    #[error("unsupported file extension: {path}")]
    UnsupportedExtension { path: String },
    #[error("expected a {expected} asset")]
    UnsupportedModel { expected: &'static str },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MmdError>;

impl MmdError {
    pub fn corrupted(self, entity: &'static str, index: usize, field: &'static str) -> Self {
        Self::Corrupted {
            entity,
            index,
            field,
            cause: Box::new(self),
        }
    }

    pub fn decompression(block: usize, reason: impl Into<String>) -> Self {
        Self::DecompressionFailed {
            block,
            reason: reason.into(),
        }
    }

    /// The innermost error kind, looking through `Corrupted` and `ModelCopyFailed` wrappers.
    pub fn root(&self) -> &MmdError {
        match self {
            Self::Corrupted { cause, .. } | Self::ModelCopyFailed { cause } => cause.root(),
            other => other,
        }
    }
}

/// Attaches the entity/index/field context to a failed unpack.
pub trait ResultExt<T> {
    fn context(self, entity: &'static str, index: usize, field: &'static str) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, entity: &'static str, index: usize, field: &'static str) -> Result<T> {
        self.map_err(|e| e.corrupted(entity, index, field))
    }
}

#[test]
fn test_root_looks_through_context() {
    let err = MmdError::UnexpectedEof.corrupted("vertex", 3, "position");
    assert!(matches!(err.root(), MmdError::UnexpectedEof));
    assert_eq!(
        "vertex[3].position: unexpected end of buffer",
        err.to_string()
    );
}
