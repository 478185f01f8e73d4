use clap::Subcommand;
use serde_json::json;

use crate::cli::output::output_success;
use crate::cli::OutputFormat;
use crate::services::directory_service::CreateUser;
use crate::services::DirectoryService;

#[derive(Subcommand)]
pub enum UserCommands {
    #[command(about = "Create a back-office user")]
    Create {
        #[arg(long, help = "Site id, domain or alias")]
        site: String,

        #[arg(long)]
        email: String,

        #[arg(long)]
        name: String,

        #[arg(long)]
        password: String,

        #[arg(long, help = "Grant every permission on every site")]
        super_admin: bool,
    },
}

pub async fn handle(cmd: UserCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        UserCommands::Create {
            site,
            email,
            name,
            password,
            super_admin,
        } => {
            let pool = crate::cli::connect().await?;
            let site = crate::cli::find_site(&pool, &site).await?;

            let detail = DirectoryService::new(pool)
                .create_user(
                    site.id,
                    CreateUser {
                        email,
                        name,
                        password,
                        phone: None,
                        department_id: None,
                        role_ids: Vec::new(),
                        is_super_admin: super_admin,
                    },
                )
                .await?;

            output_success(
                &output_format,
                &format!("Created user '{}' on {}", detail.user.email, site.domain),
                Some(json!({ "user": detail })),
            )
        }
    }
}
