use clap::Subcommand;

use crate::cli::output::{cell, output_empty_collection, output_json};
use crate::cli::OutputFormat;

#[derive(Subcommand)]
pub enum SiteCommands {
    #[command(about = "List sites")]
    List {
        #[arg(long, help = "Include deactivated sites")]
        all: bool,
    },
}

pub async fn handle(cmd: SiteCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        SiteCommands::List { all } => {
            let pool = crate::cli::connect().await?;
            let sites = crate::cli::site_service(&pool).list(all).await?;

            if sites.is_empty() {
                return output_empty_collection(&output_format, "sites", "No sites configured");
            }

            match output_format {
                OutputFormat::Json => output_json("sites", &sites)?,
                OutputFormat::Text => {
                    println!("{:<20} {:<30} {:<7} {}", "NAME", "DOMAIN", "ACTIVE", "ID");
                    println!("{}", "-".repeat(96));
                    for site in &sites {
                        println!(
                            "{:<20} {:<30} {:<7} {}",
                            cell(&site.name, 20),
                            cell(&site.domain, 30),
                            if site.is_active { "yes" } else { "no" },
                            site.id
                        );
                    }
                }
            }
            Ok(())
        }
    }
}
