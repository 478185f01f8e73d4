use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::cli::OutputFormat;
use crate::database::models::Site;
use crate::services::catalog_service::CreateCategory;
use crate::services::directory_service::{CreateDepartment, CreateRole, CreateUser};
use crate::services::sales_service::CreateResponsibility;
use crate::services::site_service::{normalize_host, CreateSite};
use crate::services::{CatalogService, DirectoryService, SalesService, ServiceError};

/// Top-level layout of a seed file
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedFile {
    #[serde(default)]
    pub sites: Vec<SeedSite>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedSite {
    pub name: String,
    pub domain: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub contact_email: Option<String>,
    #[serde(default)]
    pub roles: Vec<SeedRole>,
    #[serde(default)]
    pub departments: Vec<SeedDepartment>,
    #[serde(default)]
    pub categories: Vec<SeedCategory>,
    #[serde(default)]
    pub users: Vec<SeedUser>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedRole {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedDepartment {
    pub name: String,
    /// Name of a department listed earlier in the same site
    pub parent: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedCategory {
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    #[serde(default)]
    pub sort_order: i32,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedUser {
    pub email: String,
    pub name: String,
    pub password: String,
    pub department: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub super_admin: bool,
    /// Root category slugs this user handles in the inquiry rotation
    #[serde(default)]
    pub sales_categories: Vec<String>,
}

impl SeedFile {
    pub fn from_yaml(raw: &str) -> anyhow::Result<Self> {
        let seed: SeedFile = serde_yaml::from_str(raw).context("invalid seed YAML")?;
        seed.validate()?;
        Ok(seed)
    }

    /// Catch reference mistakes before touching the database
    fn validate(&self) -> anyhow::Result<()> {
        for site in &self.sites {
            if normalize_host(&site.domain).is_none() {
                anyhow::bail!("site '{}': invalid domain '{}'", site.name, site.domain);
            }

            let mut known_departments: Vec<&str> = Vec::new();
            for department in &site.departments {
                if let Some(parent) = department.parent.as_deref() {
                    if !known_departments.contains(&parent) {
                        anyhow::bail!(
                            "site '{}': department '{}' references unknown parent '{}'",
                            site.name,
                            department.name,
                            parent
                        );
                    }
                }
                known_departments.push(&department.name);
            }

            for user in &site.users {
                if let Some(department) = user.department.as_deref() {
                    if !known_departments.contains(&department) {
                        anyhow::bail!("site '{}': user '{}' references unknown department '{}'", site.name, user.email, department);
                    }
                }
                if let Some(role) = user.roles.iter().find(|r| !site.roles.iter().any(|known| &known.name == *r)) {
                    anyhow::bail!("site '{}': user '{}' references unknown role '{}'", site.name, user.email, role);
                }
                if let Some(slug) = user
                    .sales_categories
                    .iter()
                    .find(|s| !site.categories.iter().any(|known| &known.slug == *s))
                {
                    anyhow::bail!("site '{}': user '{}' references unknown category '{}'", site.name, user.email, slug);
                }
            }
        }
        Ok(())
    }
}

/// Counts of rows written and rows that already existed
#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct SeedReport {
    pub sites: usize,
    pub roles: usize,
    pub departments: usize,
    pub categories: usize,
    pub users: usize,
    pub responsibilities: usize,
    pub existing: usize,
}

pub async fn handle(path: &Path, output_format: OutputFormat) -> anyhow::Result<()> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("could not read {}", path.display()))?;
    let seed = SeedFile::from_yaml(&raw)?;

    let pool = crate::cli::connect().await?;
    let mut report = SeedReport::default();
    for site in seed.sites {
        seed_site(&pool, site, &mut report).await?;
    }

    match output_format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({ "success": true, "seeded": report }))?
            );
        }
        OutputFormat::Text => {
            println!("✓ Seed applied from {}", path.display());
            println!("  sites:            {}", report.sites);
            println!("  roles:            {}", report.roles);
            println!("  departments:      {}", report.departments);
            println!("  categories:       {}", report.categories);
            println!("  users:            {}", report.users);
            println!("  responsibilities: {}", report.responsibilities);
            println!("  already present:  {}", report.existing);
        }
    }
    Ok(())
}

async fn seed_site(pool: &PgPool, input: SeedSite, report: &mut SeedReport) -> anyhow::Result<()> {
    let site = match crate::cli::find_site(pool, &input.domain).await {
        Ok(site) => {
            report.existing += 1;
            site
        }
        Err(_) => {
            let site = crate::cli::site_service(pool)
                .create(CreateSite {
                    name: input.name.clone(),
                    domain: input.domain.clone(),
                    aliases: input.aliases.clone(),
                    contact_email: input.contact_email.clone(),
                })
                .await?;
            report.sites += 1;
            site
        }
    };
    info!(site_id = %site.id, "Seeding site {}", site.domain);

    let directory = DirectoryService::new(pool.clone());
    let catalog = CatalogService::new(pool.clone());

    for role in input.roles {
        let created = directory
            .create_role(
                site.id,
                CreateRole {
                    name: role.name,
                    description: role.description,
                    permissions: role.permissions,
                },
            )
            .await;
        tally(created, &mut report.roles, &mut report.existing)?;
    }
    let roles: HashMap<String, Uuid> = directory
        .list_roles(site.id)
        .await?
        .into_iter()
        .map(|r| (r.name, r.id))
        .collect();

    let mut departments: HashMap<String, Uuid> = directory
        .list_departments(site.id)
        .await?
        .into_iter()
        .map(|d| (d.name, d.id))
        .collect();
    for department in input.departments {
        if departments.contains_key(&department.name) {
            report.existing += 1;
            continue;
        }
        let parent_id = department.parent.as_ref().and_then(|p| departments.get(p).copied());
        let created = directory
            .create_department(
                site.id,
                CreateDepartment {
                    name: department.name,
                    parent_id,
                    manager_id: None,
                },
            )
            .await?;
        report.departments += 1;
        departments.insert(created.name.clone(), created.id);
    }

    for category in input.categories {
        let created = catalog
            .create_category(
                site.id,
                CreateCategory {
                    name: category.name,
                    slug: category.slug,
                    parent_id: None,
                    description: category.description,
                    image_url: None,
                    sort_order: category.sort_order,
                    is_active: true,
                },
            )
            .await;
        tally(created, &mut report.categories, &mut report.existing)?;
    }
    let categories: HashMap<String, Uuid> = catalog
        .list_categories(site.id, false)
        .await?
        .into_iter()
        .filter(|c| c.parent_id.is_none())
        .map(|c| (c.slug, c.id))
        .collect();

    let sales = SalesService::new(pool.clone());
    for user in input.users {
        let role_ids = user.roles.iter().filter_map(|name| roles.get(name).copied()).collect();
        let department_id = user.department.as_ref().and_then(|d| departments.get(d).copied());
        let user_id = match directory
            .create_user(
                site.id,
                CreateUser {
                    email: user.email.clone(),
                    name: user.name,
                    password: user.password,
                    phone: None,
                    department_id,
                    role_ids,
                    is_super_admin: user.super_admin,
                },
            )
            .await
        {
            Ok(detail) => {
                report.users += 1;
                detail.user.id
            }
            Err(ServiceError::Conflict(_)) => {
                report.existing += 1;
                existing_user_id(pool, &site, &user.email).await?
            }
            Err(e) => return Err(e.into()),
        };

        for slug in &user.sales_categories {
            let Some(category_id) = categories.get(slug).copied() else {
                anyhow::bail!("category '{}' is not a root category of {}", slug, site.domain);
            };
            let created = sales
                .create(
                    site.id,
                    CreateResponsibility {
                        user_id,
                        master_category_id: category_id,
                        is_auto_assign: true,
                    },
                )
                .await;
            tally(created, &mut report.responsibilities, &mut report.existing)?;
        }
    }
    Ok(())
}

/// Count a created row, or an existing one when the insert hit a unique constraint
fn tally<T>(result: Result<T, ServiceError>, created: &mut usize, existing: &mut usize) -> anyhow::Result<()> {
    match result {
        Ok(_) => *created += 1,
        Err(ServiceError::Conflict(_)) => *existing += 1,
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

async fn existing_user_id(pool: &PgPool, site: &Site, email: &str) -> anyhow::Result<Uuid> {
    let row: (Uuid,) = sqlx::query_as("SELECT id FROM users WHERE site_id = $1 AND lower(email) = lower($2)")
        .bind(site.id)
        .bind(email.trim())
        .fetch_one(pool)
        .await
        .with_context(|| format!("user '{}' exists but could not be loaded", email))?;
    Ok(row.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
sites:
  - name: Acme Pumps
    domain: acme.example.com
    aliases: [www.acme.example.com]
    roles:
      - name: Sales
        permissions: [inquiry:read, inquiry:write]
    departments:
      - name: Sales
      - name: Export
        parent: Sales
    categories:
      - name: Pumps
        slug: pumps
    users:
      - email: admin@acme.example.com
        name: Admin
        password: change-me-now
        super_admin: true
      - email: rep@acme.example.com
        name: Rep
        password: change-me-now
        department: Export
        roles: [Sales]
        sales_categories: [pumps]
"#;

    #[test]
    fn parses_sample_seed() {
        let seed = SeedFile::from_yaml(SAMPLE).unwrap();
        assert_eq!(seed.sites.len(), 1);
        let site = &seed.sites[0];
        assert_eq!(site.departments[1].parent.as_deref(), Some("Sales"));
        assert!(site.users[0].super_admin);
        assert_eq!(site.users[1].sales_categories, vec!["pumps"]);
    }

    #[test]
    fn rejects_unknown_role_reference() {
        let raw = SAMPLE.replace("roles: [Sales]", "roles: [Support]");
        let err = SeedFile::from_yaml(&raw).unwrap_err();
        assert!(err.to_string().contains("unknown role 'Support'"));
    }

    #[test]
    fn rejects_parent_declared_later() {
        let raw = r#"
sites:
  - name: Acme
    domain: acme.example.com
    departments:
      - name: Export
        parent: Sales
      - name: Sales
"#;
        let err = SeedFile::from_yaml(raw).unwrap_err();
        assert!(err.to_string().contains("unknown parent 'Sales'"));
    }

    #[test]
    fn rejects_unknown_fields() {
        let raw = "sites:\n  - name: Acme\n    domain: acme.example.com\n    colour: red\n";
        assert!(SeedFile::from_yaml(raw).is_err());
    }

    #[test]
    fn tally_counts_conflicts_as_existing() {
        let mut created = 0;
        let mut existing = 0;
        tally::<()>(Ok(()), &mut created, &mut existing).unwrap();
        tally::<()>(Err(ServiceError::conflict("dup")), &mut created, &mut existing).unwrap();
        assert_eq!((created, existing), (1, 1));
        assert!(tally::<()>(Err(ServiceError::not_found("x")), &mut created, &mut existing).is_err());
    }
}
