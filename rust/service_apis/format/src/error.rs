use thiserror::Error;

#[derive(Error, Debug)]
pub enum FormatError {
    #[error("no handler registered for this buffer")]
    NoHandler,

    #[error("format `{format_key}` does not support reconstruction")]
    NotReconstructable { format_key: String },

    #[error("corrupt input: {0}")]
    Corrupt(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
