pub mod commands;
pub mod output;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::models::Site;
use crate::database::DatabaseManager;
use crate::services::site_service::normalize_host;
use crate::services::{SiteCache, SiteService};

#[derive(Parser)]
#[command(name = "b2b")]
#[command(about = "B2B CLI - administration tool for the multi-site commerce backend")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Apply pending database migrations")]
    Migrate,

    #[command(about = "Load sites, roles, departments, admin users and root categories from YAML")]
    Seed {
        #[arg(help = "Path to the seed YAML file")]
        path: std::path::PathBuf,
    },

    #[command(about = "Site management")]
    Site {
        #[command(subcommand)]
        cmd: commands::site::SiteCommands,
    },

    #[command(about = "User management")]
    User {
        #[command(subcommand)]
        cmd: commands::user::UserCommands,
    },

    #[command(about = "Check a running server's /health endpoint")]
    Health {
        #[arg(long, default_value = "http://127.0.0.1:3000", help = "Base URL of the API server")]
        url: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);

    match cli.command {
        Commands::Migrate => commands::migrate::handle(output_format).await,
        Commands::Seed { path } => commands::seed::handle(&path, output_format).await,
        Commands::Site { cmd } => commands::site::handle(cmd, output_format).await,
        Commands::User { cmd } => commands::user::handle(cmd, output_format).await,
        Commands::Health { url } => commands::health::handle(&url, output_format).await,
    }
}

/// Open a verified pool from DATABASE_URL and friends
pub(crate) async fn connect() -> anyhow::Result<PgPool> {
    DatabaseManager::connect(&crate::config::config().database)
        .await
        .context("could not connect to the database")
}

/// Site service without host caching; CLI runs are short-lived
pub(crate) fn site_service(pool: &PgPool) -> SiteService {
    SiteService::new(pool.clone(), Arc::new(SiteCache::new(Duration::ZERO)))
}

/// Find a site by id, primary domain or alias, inactive sites included
pub(crate) async fn find_site(pool: &PgPool, reference: &str) -> anyhow::Result<Site> {
    let sites = site_service(pool);
    if let Ok(id) = Uuid::parse_str(reference) {
        return Ok(sites.get(id).await?);
    }
    let host = normalize_host(reference).ok_or_else(|| anyhow::anyhow!("'{}' is not a site id or domain", reference))?;
    sites
        .list(true)
        .await?
        .into_iter()
        .find(|site| site.domain == host || site.aliases.iter().any(|alias| *alias == host))
        .ok_or_else(|| anyhow::anyhow!("Site '{}' not found", reference))
}
