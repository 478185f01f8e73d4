use std::collections::HashMap;

use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use super::CatalogService;
use crate::database::models::{Category, CategoryNode};
use crate::services::site_service::conflict_on_unique;
use crate::services::{clean, double_option, is_valid_slug, ServiceError};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCategory {
    pub name: String,
    pub slug: String,
    pub parent_id: Option<Uuid>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    #[serde(default)]
    pub sort_order: i32,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateCategory {
    pub name: Option<String>,
    pub slug: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub parent_id: Option<Option<Uuid>>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub sort_order: Option<i32>,
    pub is_active: Option<bool>,
}

/// Nest a flat category list. Rows whose parent is not in the list are dropped,
/// so filtering out an inactive parent hides its whole branch.
pub fn build_tree(categories: Vec<Category>) -> Vec<CategoryNode> {
    let mut children: HashMap<Option<Uuid>, Vec<Category>> = HashMap::new();
    for category in categories {
        children.entry(category.parent_id).or_default().push(category);
    }

    fn attach(parent: Option<Uuid>, children: &mut HashMap<Option<Uuid>, Vec<Category>>) -> Vec<CategoryNode> {
        let mut level = children.remove(&parent).unwrap_or_default();
        level.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then_with(|| a.name.cmp(&b.name)));
        level
            .into_iter()
            .map(|category| {
                let nested = attach(Some(category.id), children);
                CategoryNode {
                    category,
                    children: nested,
                }
            })
            .collect()
    }

    attach(None, &mut children)
}

/// True when making `new_parent` the parent of `id` would put `id` among its own ancestors
pub fn would_create_cycle(id: Uuid, new_parent: Uuid, parents: &HashMap<Uuid, Option<Uuid>>) -> bool {
    let mut cursor = Some(new_parent);
    let mut steps = 0;
    while let Some(current) = cursor {
        if current == id {
            return true;
        }
        steps += 1;
        if steps > parents.len() {
            // Existing data already loops; refuse to extend it
            return true;
        }
        cursor = parents.get(&current).copied().flatten();
    }
    false
}

/// Sales responsibilities attach to root categories only
pub fn demotes_root(current_parent: Option<Uuid>, new_parent: Option<Uuid>) -> bool {
    current_parent.is_none() && new_parent.is_some()
}

impl CatalogService {
    pub async fn list_categories(&self, site_id: Uuid, active_only: bool) -> Result<Vec<Category>, ServiceError> {
        let categories = sqlx::query_as::<_, Category>(
            "SELECT * FROM categories
             WHERE site_id = $1 AND (is_active OR NOT $2)
             ORDER BY sort_order, name, id",
        )
        .bind(site_id)
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?;
        Ok(categories)
    }

    pub async fn category_tree(&self, site_id: Uuid, active_only: bool) -> Result<Vec<CategoryNode>, ServiceError> {
        Ok(build_tree(self.list_categories(site_id, active_only).await?))
    }

    pub async fn get_category(&self, site_id: Uuid, id: Uuid) -> Result<Category, ServiceError> {
        sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE site_id = $1 AND id = $2")
            .bind(site_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("Category '{}' not found", id)))
    }

    pub async fn create_category(&self, site_id: Uuid, input: CreateCategory) -> Result<Category, ServiceError> {
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(ServiceError::field("name", "Name is required"));
        }
        let slug = input.slug.trim().to_string();
        if !is_valid_slug(&slug) {
            return Err(ServiceError::field("slug", "Slug must be lowercase letters, digits and dashes"));
        }
        if let Some(parent_id) = input.parent_id {
            self.get_category(site_id, parent_id).await.map_err(|_| ServiceError::field("parent_id", "Parent category not found"))?;
        }

        let category = sqlx::query_as::<_, Category>(
            "INSERT INTO categories (site_id, parent_id, name, slug, description, image_url, sort_order, is_active)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING *",
        )
        .bind(site_id)
        .bind(input.parent_id)
        .bind(&name)
        .bind(&slug)
        .bind(clean(input.description))
        .bind(clean(input.image_url))
        .bind(input.sort_order)
        .bind(input.is_active)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, format!("Category slug '{}' already exists", slug)))?;

        info!(site_id = %site_id, category_id = %category.id, "Created category '{}'", category.slug);
        Ok(category)
    }

    pub async fn update_category(&self, site_id: Uuid, id: Uuid, input: UpdateCategory) -> Result<Category, ServiceError> {
        let existing = self.get_category(site_id, id).await?;

        let name = clean(input.name);
        let slug = clean(input.slug);
        if let Some(slug) = &slug {
            if !is_valid_slug(slug) {
                return Err(ServiceError::field("slug", "Slug must be lowercase letters, digits and dashes"));
            }
        }

        let parent_id = match input.parent_id {
            Some(Some(parent_id)) => {
                self.get_category(site_id, parent_id)
                    .await
                    .map_err(|_| ServiceError::field("parent_id", "Parent category not found"))?;
                let rows: Vec<(Uuid, Option<Uuid>)> =
                    sqlx::query_as("SELECT id, parent_id FROM categories WHERE site_id = $1")
                        .bind(site_id)
                        .fetch_all(&self.pool)
                        .await?;
                let parents: HashMap<Uuid, Option<Uuid>> = rows.into_iter().collect();
                if would_create_cycle(id, parent_id, &parents) {
                    return Err(ServiceError::Unprocessable(
                        "A category cannot be moved under itself or one of its descendants".to_string(),
                    ));
                }
                Some(parent_id)
            }
            Some(None) => None,
            None => existing.parent_id,
        };

        if demotes_root(existing.parent_id, parent_id) {
            let (responsibilities,): (i64,) =
                sqlx::query_as("SELECT COUNT(*) FROM sales_responsibilities WHERE master_category_id = $1")
                    .bind(id)
                    .fetch_one(&self.pool)
                    .await?;
            if responsibilities > 0 {
                return Err(ServiceError::conflict(format!(
                    "Category has {} sales responsibilities; reassign them before moving it",
                    responsibilities
                )));
            }
        }

        let category = sqlx::query_as::<_, Category>(
            "UPDATE categories SET
                name = COALESCE($3, name),
                slug = COALESCE($4, slug),
                parent_id = $5,
                description = COALESCE($6, description),
                image_url = COALESCE($7, image_url),
                sort_order = COALESCE($8, sort_order),
                is_active = COALESCE($9, is_active),
                updated_at = now()
             WHERE site_id = $1 AND id = $2
             RETURNING *",
        )
        .bind(site_id)
        .bind(id)
        .bind(&name)
        .bind(&slug)
        .bind(parent_id)
        .bind(clean(input.description))
        .bind(clean(input.image_url))
        .bind(input.sort_order)
        .bind(input.is_active)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "Category slug already exists".to_string()))?;

        Ok(category)
    }

    pub async fn delete_category(&self, site_id: Uuid, id: Uuid) -> Result<(), ServiceError> {
        self.get_category(site_id, id).await?;

        let (children,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM categories WHERE parent_id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        if children > 0 {
            return Err(ServiceError::conflict(format!("Category has {} child categories", children)));
        }

        let (products,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM product_categories WHERE category_id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        if products > 0 {
            return Err(ServiceError::conflict(format!("Category is linked to {} products", products)));
        }

        sqlx::query("DELETE FROM categories WHERE site_id = $1 AND id = $2")
            .bind(site_id)
            .bind(id)
            .execute(&self.pool)
            .await?;

        info!(site_id = %site_id, category_id = %id, "Deleted category");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn category(name: &str, parent_id: Option<Uuid>, sort_order: i32) -> Category {
        Category {
            id: Uuid::new_v4(),
            site_id: Uuid::nil(),
            parent_id,
            name: name.to_string(),
            slug: name.to_lowercase(),
            description: None,
            image_url: None,
            sort_order,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn tree_nests_and_orders() {
        let metals = category("Metals", None, 1);
        let plastics = category("Plastics", None, 0);
        let steel = category("Steel", Some(metals.id), 0);
        let pipes = category("Pipes", Some(steel.id), 0);

        let tree = build_tree(vec![pipes.clone(), steel.clone(), metals.clone(), plastics.clone()]);
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].category.id, plastics.id);
        assert_eq!(tree[1].category.id, metals.id);
        assert_eq!(tree[1].children[0].category.id, steel.id);
        assert_eq!(tree[1].children[0].children[0].category.id, pipes.id);
    }

    #[test]
    fn tree_drops_orphaned_branches() {
        let hidden_parent = Uuid::new_v4();
        let orphan = category("Orphan", Some(hidden_parent), 0);
        let root = category("Root", None, 0);
        let tree = build_tree(vec![orphan, root.clone()]);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].category.id, root.id);
    }

    #[test]
    fn detects_cycles() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let d = Uuid::new_v4();
        let parents: HashMap<Uuid, Option<Uuid>> =
            [(a, None), (b, Some(a)), (c, Some(b)), (d, None)].into_iter().collect();

        assert!(would_create_cycle(a, a, &parents));
        assert!(would_create_cycle(a, c, &parents));
        assert!(!would_create_cycle(c, a, &parents));
        assert!(!would_create_cycle(a, d, &parents));
    }

    #[test]
    fn corrupt_loops_are_refused() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let x = Uuid::new_v4();
        let parents: HashMap<Uuid, Option<Uuid>> = [(a, Some(b)), (b, Some(a)), (x, None)].into_iter().collect();
        assert!(would_create_cycle(x, a, &parents));
    }

    #[test]
    fn only_root_to_child_moves_demote() {
        let parent = Some(Uuid::new_v4());
        assert!(demotes_root(None, parent));
        assert!(!demotes_root(None, None));
        assert!(!demotes_root(parent, Some(Uuid::new_v4())));
        assert!(!demotes_root(parent, None));
    }
}
