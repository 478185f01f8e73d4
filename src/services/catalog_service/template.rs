use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use super::CatalogService;
use crate::database::models::ProductTemplate;
use crate::services::site_service::conflict_on_unique;
use crate::services::{clean, FieldErrors, ServiceError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Number,
    Boolean,
    Select,
}

/// One attribute slot of a product template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateField {
    pub key: String,
    pub label: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTemplate {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<TemplateField>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTemplate {
    pub name: Option<String>,
    pub fields: Option<Vec<TemplateField>>,
}

fn validate_fields(fields: &[TemplateField]) -> Result<(), ServiceError> {
    let mut errors = FieldErrors::new();
    let mut seen = HashSet::new();
    for (i, field) in fields.iter().enumerate() {
        let key = field.key.trim();
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            errors.add(&format!("fields[{}].key", i), "Key must be letters, digits or underscores");
        } else if !seen.insert(key.to_string()) {
            errors.add(&format!("fields[{}].key", i), format!("Duplicate key '{}'", key));
        }
        if field.label.trim().is_empty() {
            errors.add(&format!("fields[{}].label", i), "Label is required");
        }
        if field.kind == FieldKind::Select && field.options.is_empty() {
            errors.add(&format!("fields[{}].options", i), "Select fields need options");
        }
    }
    errors.into_result()
}

/// Check product attributes against a template's declared fields.
/// Keys the template does not declare are kept as free-form attributes.
pub fn validate_attributes(fields: &[TemplateField], attributes: &Value) -> Result<(), ServiceError> {
    let map = match attributes {
        Value::Object(map) => map,
        Value::Null if fields.iter().all(|f| !f.required) => return Ok(()),
        _ => return Err(ServiceError::field("attributes", "Attributes must be an object")),
    };

    let mut errors = FieldErrors::new();
    for field in fields {
        let path = format!("attributes.{}", field.key);
        let value = map.get(&field.key).filter(|v| !is_blank(v));
        let value = match value {
            Some(value) => value,
            None => {
                if field.required {
                    errors.add(&path, format!("{} is required", field.label));
                }
                continue;
            }
        };

        let ok = match field.kind {
            FieldKind::Text => value.is_string() || value.is_number(),
            FieldKind::Number => value.is_number() || value.as_str().map(|s| s.trim().parse::<f64>().is_ok()).unwrap_or(false),
            FieldKind::Boolean => value.is_boolean(),
            FieldKind::Select => value.as_str().map(|s| field.options.iter().any(|o| o == s)).unwrap_or(false),
        };
        if !ok {
            errors.add(&path, format!("{} has the wrong type", field.label));
        }
    }
    errors.into_result()
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

pub(super) fn parse_fields(template: &ProductTemplate) -> Result<Vec<TemplateField>, ServiceError> {
    serde_json::from_value(template.fields.clone())
        .map_err(|e| ServiceError::Internal(format!("Template '{}' has malformed fields: {}", template.id, e)))
}

impl CatalogService {
    pub async fn list_templates(&self, site_id: Uuid) -> Result<Vec<ProductTemplate>, ServiceError> {
        let templates = sqlx::query_as::<_, ProductTemplate>("SELECT * FROM product_templates WHERE site_id = $1 ORDER BY name, id")
            .bind(site_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(templates)
    }

    pub async fn get_template(&self, site_id: Uuid, id: Uuid) -> Result<ProductTemplate, ServiceError> {
        sqlx::query_as::<_, ProductTemplate>("SELECT * FROM product_templates WHERE site_id = $1 AND id = $2")
            .bind(site_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("Template '{}' not found", id)))
    }

    pub async fn create_template(&self, site_id: Uuid, input: CreateTemplate) -> Result<ProductTemplate, ServiceError> {
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(ServiceError::field("name", "Name is required"));
        }
        validate_fields(&input.fields)?;
        let fields = serde_json::to_value(&input.fields).map_err(|e| ServiceError::Internal(e.to_string()))?;

        let template = sqlx::query_as::<_, ProductTemplate>(
            "INSERT INTO product_templates (site_id, name, fields) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(site_id)
        .bind(&name)
        .bind(&fields)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, format!("Template '{}' already exists", name)))?;

        info!(site_id = %site_id, template_id = %template.id, "Created product template '{}'", template.name);
        Ok(template)
    }

    pub async fn update_template(&self, site_id: Uuid, id: Uuid, input: UpdateTemplate) -> Result<ProductTemplate, ServiceError> {
        let fields = match &input.fields {
            Some(fields) => {
                validate_fields(fields)?;
                Some(serde_json::to_value(fields).map_err(|e| ServiceError::Internal(e.to_string()))?)
            }
            None => None,
        };

        sqlx::query_as::<_, ProductTemplate>(
            "UPDATE product_templates SET
                name = COALESCE($3, name),
                fields = COALESCE($4, fields),
                updated_at = now()
             WHERE site_id = $1 AND id = $2
             RETURNING *",
        )
        .bind(site_id)
        .bind(id)
        .bind(clean(input.name))
        .bind(fields)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "Template name already exists".to_string()))?
        .ok_or_else(|| ServiceError::not_found(format!("Template '{}' not found", id)))
    }

    pub async fn delete_template(&self, site_id: Uuid, id: Uuid) -> Result<(), ServiceError> {
        let result = sqlx::query("DELETE FROM product_templates WHERE site_id = $1 AND id = $2")
            .bind(site_id)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ServiceError::not_found(format!("Template '{}' not found", id)));
        }
        Ok(())
    }

    /// Validate attributes against the template when one is set
    pub(super) async fn check_attributes(
        &self,
        site_id: Uuid,
        template_id: Option<Uuid>,
        attributes: &Value,
    ) -> Result<(), ServiceError> {
        let template_id = match template_id {
            Some(id) => id,
            None => return Ok(()),
        };
        let template = self
            .get_template(site_id, template_id)
            .await
            .map_err(|_| ServiceError::field("template_id", "Template not found"))?;
        validate_attributes(&parse_fields(&template)?, attributes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields() -> Vec<TemplateField> {
        serde_json::from_value(json!([
            {"key": "material", "label": "Material", "kind": "text", "required": true},
            {"key": "weight_kg", "label": "Weight", "kind": "number"},
            {"key": "food_safe", "label": "Food safe", "kind": "boolean"},
            {"key": "finish", "label": "Finish", "kind": "select", "options": ["matte", "gloss"]}
        ]))
        .unwrap()
    }

    fn field_errors(err: ServiceError) -> std::collections::HashMap<String, String> {
        match err {
            ServiceError::Validation { field_errors, .. } => field_errors,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn accepts_complete_attributes() {
        let attrs = json!({"material": "304 steel", "weight_kg": "2.5", "food_safe": true, "finish": "matte", "extra": 1});
        assert!(validate_attributes(&fields(), &attrs).is_ok());
    }

    #[test]
    fn reports_missing_required_keys() {
        let errors = field_errors(validate_attributes(&fields(), &json!({"material": "  "})).unwrap_err());
        assert_eq!(errors["attributes.material"], "Material is required");
    }

    #[test]
    fn reports_type_mismatches() {
        let attrs = json!({"material": "pp", "weight_kg": "heavy", "food_safe": "yes", "finish": "satin"});
        let errors = field_errors(validate_attributes(&fields(), &attrs).unwrap_err());
        assert_eq!(errors.len(), 3);
        assert!(errors.contains_key("attributes.weight_kg"));
        assert!(errors.contains_key("attributes.finish"));
    }

    #[test]
    fn non_object_attributes_are_rejected() {
        assert!(validate_attributes(&fields(), &json!([1, 2])).is_err());
        assert!(validate_attributes(&[], &Value::Null).is_ok());
    }

    #[test]
    fn field_definitions_are_checked() {
        let mut defs = fields();
        defs.push(defs[0].clone());
        defs.push(TemplateField {
            key: "color".into(),
            label: "Color".into(),
            kind: FieldKind::Select,
            required: false,
            options: vec![],
        });
        let errors = field_errors(validate_fields(&defs).unwrap_err());
        assert!(errors["fields[4].key"].starts_with("Duplicate key"));
        assert!(errors.contains_key("fields[5].options"));
    }
}
