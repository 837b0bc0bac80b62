//! Serves the RPC surface as line-delimited JSON over stdin/stdout.
//!
//! Environment:
//! - `OTPGUARD_CONFIG`: JSON engine config (defaults: SHA1, 6 digits, 30s, ±1 step)
//! - `OTPGUARD_STORE`: JSON record store; records are kept in memory only when unset
//! - `OTPGUARD_LOG`: tracing filter directives, `info` by default

use std::{
    env,
    io::{self, BufRead, Write},
    sync::Arc,
};

use anyhow::Context;
use otpguard::{
    authenticator::Authenticator,
    clock::SystemClock,
    config::EngineConfig,
    store::{FileStore, MemoryStore, RecordStore},
};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn serve<S: RecordStore>(authenticator: Authenticator<S>) -> anyhow::Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();

    for line in stdin.lock().lines() {
        let line = line.context("failed to read request")?;
        if line.trim().is_empty() {
            continue;
        }

        let response = authenticator.handle_json(&line)?;
        writeln!(stdout, "{response}")?;
        stdout.flush()?;
    }

    Ok(())
}

pub fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_env("OTPGUARD_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let config = match env::var_os("OTPGUARD_CONFIG") {
        Some(path) => EngineConfig::from_json_file(&path)
            .with_context(|| format!("failed to load config from {}", path.to_string_lossy()))?,
        None => EngineConfig::default(),
    };
    let clock = Arc::new(SystemClock);

    info!(
        step = config.step,
        digits = config.digits,
        algorithm = %config.algorithm,
        "otpguard ready"
    );

    match env::var_os("OTPGUARD_STORE") {
        Some(path) => {
            let store = FileStore::open(&path)?;
            serve(Authenticator::new(store, config, clock)?)
        }
        None => serve(Authenticator::new(MemoryStore::new(), config, clock)?),
    }
}
