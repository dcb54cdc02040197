//! The `molar` bridge process.
//!
//! Configuration comes from `molar.toml` in the working directory or the
//! user config directory, `MOLAR_*` variables, and the legacy `FASTAPI_URL`
//! and `PORT` variables. See `molar.example.toml`.

use anyhow::{Context, Result};
use molar::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    let runtime = MolarRuntime::builder()
        .build()
        .context("failed to load configuration")?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting molar");
    runtime.run().await.context("bridge stopped with an error")?;
    Ok(())
}
