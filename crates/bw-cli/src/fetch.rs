//! Pre-built engine download.
//!
//! Mirrors the extension's fastest bootstrap path from the command line:
//! fetch the CDN config document, pick the engine entry matching the
//! supported blob format version, download the payload, and seal it in the
//! envelope so it can ship as the bundled asset or seed a cache.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use bw_engine::envelope;

/// CDN config document: a map from blob format version to the pre-built
/// engine published for it.
#[derive(Debug, Deserialize)]
struct CdnConfig {
    engines: HashMap<String, CdnEngine>,
}

#[derive(Debug, Deserialize)]
struct CdnEngine {
    url: String,
}

pub struct FetchOptions {
    pub config_url: String,
    pub output: String,
}

pub fn run_fetch(opts: FetchOptions) -> Result<(), String> {
    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| format!("Failed to start tokio runtime: {}", e))?;
    runtime.block_on(run_fetch_async(opts))
}

async fn run_fetch_async(opts: FetchOptions) -> Result<(), String> {
    let config: CdnConfig = reqwest::get(&opts.config_url)
        .await
        .map_err(|e| format!("Failed to fetch '{}': {}", opts.config_url, e))?
        .json()
        .await
        .map_err(|e| format!("Failed to parse config from '{}': {}", opts.config_url, e))?;

    let version_key = envelope::ENVELOPE_VERSION.to_string();
    let engine = config.engines.get(&version_key).ok_or_else(|| {
        format!(
            "Config lists no engine for format version {} (available: {})",
            version_key,
            config
                .engines
                .keys()
                .cloned()
                .collect::<Vec<_>>()
                .join(", ")
        )
    })?;

    let payload = reqwest::get(&engine.url)
        .await
        .map_err(|e| format!("Failed to download '{}': {}", engine.url, e))?
        .bytes()
        .await
        .map_err(|e| format!("Failed to read body of '{}': {}", engine.url, e))?;

    let blob = envelope::seal(&payload);
    write_blob(Path::new(&opts.output), &blob)?;

    println!("Fetched pre-built engine to '{}'", opts.output);
    println!("  Source:   {}", engine.url);
    println!("  Payload:  {} bytes ({:.1} KB)", payload.len(), payload.len() as f64 / 1024.0);
    println!("  Sealed:   {} bytes", blob.len());

    Ok(())
}

pub fn write_blob(path: &Path, bytes: &[u8]) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create '{}': {}", parent.display(), e))?;
        }
    }
    fs::write(path, bytes).map_err(|e| format!("Failed to write '{}': {}", path.display(), e))?;
    Ok(())
}

pub fn read_blob(path: &Path) -> Result<Vec<u8>, String> {
    fs::read(path).map_err(|e| format!("Failed to read '{}': {}", path.display(), e))
}
