use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "chunkrelay-receiver", version, about = "Chunked file-transfer receiver")]
struct Args {
    #[arg(long, default_value = "http://127.0.0.1:8080", env = "CHUNKRELAY_SERVER")]
    server: String,

    #[arg(long, default_value_t = 30, env = "CHUNKRELAY_TIMEOUT")]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List transfers known to the coordinator.
    List,
    /// Download an assembled file by its file_id.
    Download {
        file_id: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Check the SHA-256 of a local file, optionally against an expected value.
    Verify {
        path: PathBuf,
        #[arg(long)]
        checksum: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
struct FileSummary {
    file_id: String,
    filename: String,
    size: u64,
    status: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "chunkrelay=info".into()),
        )
        .init();

    let args = Args::parse();
    let client = match reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(args.timeout_secs))
        .build()
    {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "failed to build http client");
            return ExitCode::from(1);
        }
    };

    let result = match args.command {
        Command::List => list_files(&client, &args.server).await,
        Command::Download { file_id, output } => {
            download_file(&client, &args.server, &file_id, output).await
        }
        Command::Verify { path, checksum } => verify_file(&path, checksum.as_deref()).await,
    };

    match result {
        Ok(()) => ExitCode::from(0),
        Err(e) => {
            error!(error = %e, "command failed");
            ExitCode::from(1)
        }
    }
}

async fn list_files(client: &reqwest::Client, server: &str) -> anyhow::Result<()> {
    info!(server, "listing files");
    let files: Vec<FileSummary> = client
        .get(format!("{server}/api/files"))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    if files.is_empty() {
        println!("No files available");
        return Ok(());
    }

    println!("{:-<80}", "");
    println!("{:<36} {:<30} {:<12} {:<10}", "File ID", "Filename", "Size", "Status");
    println!("{:-<80}", "");
    for f in &files {
        println!(
            "{:<36} {:<30} {:<12} {:<10}",
            f.file_id,
            f.filename,
            format!("{} B", f.size),
            f.status
        );
    }
    println!("{:-<80}", "");
    Ok(())
}

async fn download_file(
    client: &reqwest::Client,
    server: &str,
    file_id: &str,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let info_resp: FileSummary = client
        .get(format!("{server}/api/files/{file_id}"))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    let output_path = match output {
        Some(path) if path.is_dir() => path.join(&info_resp.filename),
        Some(path) => path,
        None => PathBuf::from(&info_resp.filename),
    };

    info!(
        filename = %info_resp.filename,
        size = info_resp.size,
        path = %output_path.display(),
        "downloading"
    );

    let response = client
        .get(format!("{server}/download/{file_id}"))
        .send()
        .await?
        .error_for_status()?;

    let bytes = response.bytes().await?;
    let mut out = tokio::fs::File::create(&output_path).await?;
    out.write_all(&bytes).await?;
    out.flush().await?;

    if bytes.len() as u64 != info_resp.size {
        anyhow::bail!(
            "size mismatch: expected {} bytes, wrote {}",
            info_resp.size,
            bytes.len()
        );
    }

    info!(path = %output_path.display(), "download complete");
    Ok(())
}

async fn verify_file(path: &PathBuf, expected: Option<&str>) -> anyhow::Result<()> {
    let data = tokio::fs::read(path).await?;
    let checksum = hex::encode(Sha256::digest(&data));

    match expected {
        Some(expected) if expected.eq_ignore_ascii_case(&checksum) => {
            info!(checksum, "integrity verified");
            Ok(())
        }
        Some(expected) => {
            anyhow::bail!("checksum mismatch: expected {expected}, got {checksum}");
        }
        None => {
            println!("{checksum}");
            Ok(())
        }
    }
}
