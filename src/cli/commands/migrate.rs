use serde_json::json;

use crate::cli::output::output_success;
use crate::cli::OutputFormat;
use crate::database::DatabaseManager;

pub async fn handle(output_format: OutputFormat) -> anyhow::Result<()> {
    let pool = crate::cli::connect().await?;
    DatabaseManager::migrate(&pool).await?;
    DatabaseManager::close(&pool).await;

    output_success(&output_format, "Migrations applied", Some(json!({ "migrated": true })))
}
