use thiserror::Error;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("local I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("manifest registration rejected: {0}")]
    ManifestRejected(String),

    #[error("transfer aborted after exhausting retries on chunk {chunk_id}")]
    Aborted { chunk_id: u32 },

    #[error("assembly request failed: {0}")]
    AssemblyFailed(String),

    #[error("interrupted by user")]
    Interrupted,
}

pub type UploadResult<T> = std::result::Result<T, UploadError>;

/// Exit codes exactly as specified: 0 success, 1 unexpected/local I/O
/// error, 2 aborted after retry budget, 3 assembly failed, 130 user
/// interrupt.
impl UploadError {
    pub fn exit_code(&self) -> u8 {
        match self {
            UploadError::Io(_) | UploadError::ManifestRejected(_) | UploadError::Http(_) => 1,
            UploadError::Aborted { .. } => 2,
            UploadError::AssemblyFailed(_) => 3,
            UploadError::Interrupted => 130,
        }
    }
}
