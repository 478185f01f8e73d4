use std::time::Duration;

use anyhow::Context;
use serde_json::{json, Value};

use crate::cli::OutputFormat;

/// Join the base URL with /health, tolerating a trailing slash
pub fn health_url(base: &str) -> String {
    format!("{}/health", base.trim_end_matches('/'))
}

pub async fn handle(url: &str, output_format: OutputFormat) -> anyhow::Result<()> {
    let target = health_url(url);
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .context("could not build HTTP client")?;

    let response = client
        .get(&target)
        .send()
        .await
        .with_context(|| format!("could not reach {}", target))?;
    let status = response.status();
    let body: Value = response.json().await.unwrap_or(Value::Null);

    match output_format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "url": target,
                    "status": status.as_u16(),
                    "healthy": status.is_success(),
                    "body": body,
                }))?
            );
        }
        OutputFormat::Text => {
            let state = body
                .pointer("/data/status")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            println!("{} -> {} ({})", target, status.as_u16(), state);
        }
    }

    if !status.is_success() {
        anyhow::bail!("server reported {}", status);
    }
    Ok(())
}
