use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use drm_fairplay::{
    KeyExchangeCoordinator, KeyExchangeState, LicenseClient, SourceConfig, TransportOptions,
    decoder,
};
use tracing::{debug, info};
use url::Url;

use crate::replay::ReplayRequest;

const PREVIEW_BYTES: usize = 32;

pub async fn certificate(
    config_path: &Path,
    out: Option<PathBuf>,
    options: TransportOptions,
) -> Result<()> {
    let config = load_config(config_path)?;
    let url = config
        .certificate_url()
        .context("config has no certificate_url")?;
    let url = Url::parse(url)
        .with_context(|| format!("invalid certificate_url {url:?}"))?;

    let client = LicenseClient::with_options(options)
        .context("failed to build HTTP client")?;
    let certificate = client
        .fetch_certificate(&url)
        .await
        .context("failed to fetch certificate")?;
    if certificate.is_empty() {
        bail!("certificate from {url} is empty");
    }

    print_summary("Certificate", &certificate);
    write_output(out.as_deref(), &certificate).await
}

pub async fn license(
    config_path: &Path,
    locator: String,
    spc_path: &Path,
    out: Option<PathBuf>,
    options: TransportOptions,
) -> Result<()> {
    let config = load_config(config_path)?;
    let spc = tokio::fs::read(spc_path)
        .await
        .with_context(|| format!("failed to read {}", spc_path.display()))?;

    let client = LicenseClient::with_options(options)
        .context("failed to build HTTP client")?;
    let coordinator = KeyExchangeCoordinator::new(config, client);

    let request = ReplayRequest::new(spc);
    let task = coordinator.on_key_request(locator, request.clone());

    let mut states = task.subscribe();
    let progress = tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = *states.borrow_and_update();
            debug!(?state, "key exchange progress");
        }
    });

    let state = task.finished().await;
    let _ = progress.await;
    info!(?state, "key exchange finished");

    match request.take_outcome() {
        Some(Ok(ckc)) => {
            print_summary("Key response (CKC)", &ckc);
            write_output(out.as_deref(), &ckc).await
        }
        Some(Err(err)) => Err(anyhow!(err).context("license acquisition failed")),
        None if state == KeyExchangeState::Abandoned => {
            bail!("key request was abandoned before it was answered")
        }
        None => bail!("key request ended in {state:?} without an answer"),
    }
}

pub async fn decode(input: &Path, out: Option<PathBuf>) -> Result<()> {
    let data = tokio::fs::read(input)
        .await
        .with_context(|| format!("failed to read {}", input.display()))?;

    let decoded = match decoder::decode_wrapped(&data) {
        Some(decoded) => {
            println!("Input: {} bytes, base64 in markup", data.len());
            decoded
        }
        None => {
            println!("Input: {} bytes, not wrapped, passed through", data.len());
            data
        }
    };

    print_summary("Decoded", &decoded);
    write_output(out.as_deref(), &decoded).await
}

fn load_config(path: &Path) -> Result<SourceConfig> {
    let config = SourceConfig::load(path)
        .with_context(|| format!("failed to load config {}", path.display()))?;
    config
        .parsed_source_url()
        .context("config has an invalid source_url")?;
    Ok(config)
}

fn print_summary(label: &str, data: &[u8]) {
    let preview = &data[..data.len().min(PREVIEW_BYTES)];
    let more = if preview.len() < data.len() { "..." } else { "" };
    println!("{label}: {} bytes", data.len());
    println!("  {}{more}", hex::encode(preview));
}

async fn write_output(out: Option<&Path>, data: &[u8]) -> Result<()> {
    if let Some(path) = out {
        tokio::fs::write(path, data)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("Wrote {}", path.display());
    }
    Ok(())
}
