//! Kill command - terminate every process bound to a port.

use anyhow::Result;
use portdeck_core::{kill_by_port, SystemPortSource};

pub async fn run(port: u16, force: bool, json: bool) -> Result<()> {
    let source = SystemPortSource::new();
    let outcome = kill_by_port(&source, port, force).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!("{}", outcome.message);
    }

    if !outcome.success {
        std::process::exit(1);
    }
    Ok(())
}
