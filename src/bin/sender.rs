use std::path::PathBuf;
use std::process::ExitCode;

use chunkrelay::sender::{UploadError, Uploader, UploaderConfig};
use clap::Parser;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "chunkrelay-sender", version, about = "Chunked file-transfer sender")]
struct Args {
    /// File to send.
    file: PathBuf,

    #[arg(long, default_value = "http://127.0.0.1:8080", env = "CHUNKRELAY_SERVER")]
    server: String,

    #[arg(long, default_value_t = 256 * 1024, env = "CHUNKRELAY_CHUNK_SIZE")]
    chunk_size: u64,

    #[arg(long, default_value_t = 10, env = "CHUNKRELAY_MAX_RETRIES")]
    max_retries: u32,

    #[arg(long, default_value_t = 30, env = "CHUNKRELAY_TIMEOUT")]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "chunkrelay=info".into()),
        )
        .init();

    let args = Args::parse();

    if !args.file.exists() {
        error!(path = %args.file.display(), "file not found");
        return ExitCode::from(1);
    }
    if !args.file.is_file() {
        error!(path = %args.file.display(), "path is not a file");
        return ExitCode::from(1);
    }

    let filename = args
        .file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload.bin")
        .to_string();

    let config = UploaderConfig {
        base_url: args.server.clone(),
        timeout_secs: args.timeout_secs,
        initial_chunk_size: args.chunk_size,
        max_retries: args.max_retries,
    };

    let uploader = match Uploader::new(config) {
        Ok(u) => u,
        Err(e) => {
            error!(error = %e, "failed to build uploader");
            return ExitCode::from(e.exit_code());
        }
    };

    info!(file = %args.file.display(), server = %args.server, "starting transfer");

    let run = tokio::select! {
        result = uploader.upload_file(&args.file, &filename) => result,
        _ = tokio::signal::ctrl_c() => Err(UploadError::Interrupted),
    };

    match run {
        Ok(file_id) => {
            info!(file_id = %file_id, "transfer completed successfully");
            ExitCode::from(0)
        }
        Err(e) => {
            error!(error = %e, "transfer failed");
            ExitCode::from(e.exit_code())
        }
    }
}
