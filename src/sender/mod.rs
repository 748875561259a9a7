//! The sender side: adaptive chunked upload loop, network-quality
//! estimation, and retry/backoff, grounded in the original prototype's
//! `send_file.py` and the teacher's `backoff`/`reqwest`-adjacent idiom.

mod error;
mod network;
mod uploader;

pub use error::{UploadError, UploadResult};
pub use network::{adaptive_chunk_size, NetworkMonitor};
pub use uploader::{Uploader, UploaderConfig};
