//! Storefront inquiry intake and back-office inquiry handling.
//!
//! Submission is the one multi-step write in the system: the customer upsert,
//! salesperson assignment and inquiry insert commit together, and the
//! notification side-channel only starts after the commit.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{info, warn};
use uuid::Uuid;

use super::{assignment, clean, is_valid_email, FieldErrors, ServiceError};
use crate::config::ListingConfig;
use crate::database::listing::{like_pattern, ListParams, Paginated, SortOrder};
use crate::database::models::{Customer, Inquiry, Site};
use crate::notify::{quotation, InquiryNotice, NoticeAssignee, NoticeCustomer, Notifier};

const SELECT_INQUIRY: &str = "
    SELECT i.id, i.site_id, i.inquiry_no, i.customer_id,
           c.email AS customer_email, c.name AS customer_name, c.company AS customer_company,
           c.phone AS customer_phone, c.country AS customer_country,
           i.product_id, i.sku_id, i.product_name, i.sku_code, i.quantity, i.unit_price, i.currency,
           i.message, i.status, i.assigned_user_id, u.name AS assignee_name, u.email AS assignee_email,
           i.is_public, i.created_at, i.updated_at
    FROM inquiries i
    JOIN customers c ON c.id = i.customer_id
    LEFT JOIN users u ON u.id = i.assigned_user_id";

const INQUIRY_SORT_COLUMNS: &[&str] = &["created_at", "updated_at", "status", "inquiry_no"];

const INQUIRY_NO_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InquiryStatus {
    Pending,
    Processing,
    Quoted,
    Closed,
}

impl InquiryStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(InquiryStatus::Pending),
            "processing" => Some(InquiryStatus::Processing),
            "quoted" => Some(InquiryStatus::Quoted),
            "closed" => Some(InquiryStatus::Closed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InquiryStatus::Pending => "pending",
            InquiryStatus::Processing => "processing",
            InquiryStatus::Quoted => "quoted",
            InquiryStatus::Closed => "closed",
        }
    }

    /// Forward one step at a time; anything still open may be closed
    pub fn can_transition_to(&self, next: InquiryStatus) -> bool {
        use InquiryStatus::*;
        matches!(
            (self, next),
            (Pending, Processing) | (Processing, Quoted) | (Pending, Closed) | (Processing, Closed) | (Quoted, Closed)
        )
    }
}

/// `INQ-YYYYMMDD-XXXXXX`, suffix drawn from the token's bytes
pub fn generate_inquiry_no(now: DateTime<Utc>, token: Uuid) -> String {
    let suffix: String = token
        .as_bytes()
        .iter()
        .take(6)
        .map(|b| INQUIRY_NO_ALPHABET[(*b as usize) % INQUIRY_NO_ALPHABET.len()] as char)
        .collect();
    format!("INQ-{}-{}", now.format("%Y%m%d"), suffix)
}

/// Which inquiries a back-office user may see
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InquiryScope {
    Site,
    Department { department_id: Uuid, user_id: Uuid },
    Own { user_id: Uuid },
}

impl InquiryScope {
    pub fn for_user(user_id: Uuid, department_id: Option<Uuid>, read_all: bool, read_department: bool) -> Self {
        if read_all {
            return InquiryScope::Site;
        }
        match department_id {
            Some(department_id) if read_department => InquiryScope::Department { department_id, user_id },
            _ => InquiryScope::Own { user_id },
        }
    }

    fn push_sql(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        match *self {
            InquiryScope::Site => {}
            InquiryScope::Department { department_id, user_id } => {
                qb.push(" AND (i.is_public OR i.assigned_user_id = ")
                    .push_bind(user_id)
                    .push(" OR i.assigned_user_id IN (SELECT id FROM users WHERE department_id = ")
                    .push_bind(department_id)
                    .push("))");
            }
            InquiryScope::Own { user_id } => {
                qb.push(" AND (i.is_public OR i.assigned_user_id = ").push_bind(user_id).push(")");
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitInquiry {
    pub email: String,
    pub name: String,
    pub company: Option<String>,
    pub phone: Option<String>,
    pub country: Option<String>,
    pub product_id: Uuid,
    pub sku_id: Option<Uuid>,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
    pub message: Option<String>,
}

fn default_quantity() -> i32 {
    1
}

/// Submission after trimming and validation
#[derive(Debug, Clone, PartialEq)]
struct CleanSubmission {
    email: String,
    name: String,
    company: Option<String>,
    phone: Option<String>,
    country: Option<String>,
    product_id: Uuid,
    sku_id: Option<Uuid>,
    quantity: i32,
    message: Option<String>,
}

fn validate_submission(input: SubmitInquiry, max_message_chars: usize) -> Result<CleanSubmission, ServiceError> {
    let email = input.email.trim().to_ascii_lowercase();
    let name = input.name.trim().to_string();
    let message = clean(input.message);

    let mut errors = FieldErrors::new();
    errors.check(is_valid_email(&email), "email", "Invalid email format");
    errors.check(!name.is_empty(), "name", "Name is required");
    errors.check(name.chars().count() <= 200, "name", "Name is too long");
    errors.check(input.quantity >= 1, "quantity", "Quantity must be at least 1");
    if let Some(message) = &message {
        errors.check(
            message.chars().count() <= max_message_chars,
            "message",
            &format!("Message cannot exceed {} characters", max_message_chars),
        );
    }
    errors.into_result()?;

    Ok(CleanSubmission {
        email,
        name,
        company: clean(input.company),
        phone: clean(input.phone),
        country: clean(input.country),
        product_id: input.product_id,
        sku_id: input.sku_id,
        quantity: input.quantity,
        message,
    })
}

/// What the storefront gets back after a submission
#[derive(Debug, Clone, Serialize)]
pub struct InquiryReceipt {
    pub id: Uuid,
    pub inquiry_no: String,
    pub status: InquiryStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InquiryFilter {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub sort: Option<String>,
    pub q: Option<String>,
    pub status: Option<String>,
    pub is_public: Option<bool>,
}

impl InquiryFilter {
    pub fn params(&self) -> ListParams {
        ListParams {
            page: self.page,
            page_size: self.page_size,
            sort: self.sort.clone(),
            q: self.q.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateStatus {
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Reassign {
    pub user_id: Uuid,
}

#[derive(sqlx::FromRow)]
struct ProductRef {
    name: String,
}

#[derive(sqlx::FromRow)]
struct SkuRef {
    sku_code: String,
    spec: Value,
    price: Option<Decimal>,
    currency: String,
}

fn parse_status(value: &str) -> Result<InquiryStatus, ServiceError> {
    InquiryStatus::parse(value).ok_or_else(|| ServiceError::field("status", format!("Unknown status '{}'", value)))
}

fn notice_from(inquiry: &Inquiry, site_name: &str, sku_spec: Value) -> InquiryNotice {
    InquiryNotice {
        inquiry_id: inquiry.id,
        site_id: inquiry.site_id,
        site_name: site_name.to_string(),
        inquiry_no: inquiry.inquiry_no.clone(),
        created_at: inquiry.created_at,
        customer: NoticeCustomer {
            name: inquiry.customer_name.clone(),
            email: inquiry.customer_email.clone(),
            company: inquiry.customer_company.clone(),
            phone: inquiry.customer_phone.clone(),
            country: inquiry.customer_country.clone(),
        },
        product_name: inquiry.product_name.clone(),
        sku_code: inquiry.sku_code.clone(),
        sku_spec,
        quantity: inquiry.quantity,
        unit_price: inquiry.unit_price,
        currency: inquiry.currency.clone(),
        message: inquiry.message.clone(),
        assignee: match (&inquiry.assignee_name, &inquiry.assignee_email) {
            (Some(name), Some(email)) => Some(NoticeAssignee { name: name.clone(), email: email.clone() }),
            _ => None,
        },
        is_public: inquiry.is_public,
    }
}

/// Source of inquiry numbers; random by default
pub type InquiryNumberSource = Arc<dyn Fn(DateTime<Utc>) -> String + Send + Sync>;

/// Fresh numbers tried before a collision is reported
const INQUIRY_NO_ATTEMPTS: usize = 3;

pub struct InquiryService {
    pool: PgPool,
    notifier: Arc<Notifier>,
    max_message_chars: usize,
    next_inquiry_no: InquiryNumberSource,
}

impl InquiryService {
    pub fn new(pool: PgPool, notifier: Arc<Notifier>, max_message_chars: usize) -> Self {
        Self {
            pool,
            notifier,
            max_message_chars,
            next_inquiry_no: Arc::new(|now| generate_inquiry_no(now, Uuid::new_v4())),
        }
    }

    pub fn with_number_source(mut self, source: InquiryNumberSource) -> Self {
        self.next_inquiry_no = source;
        self
    }

    /// Record a storefront inquiry and hand it to a salesperson or the public pool
    pub async fn submit(
        &self,
        site: &Site,
        input: SubmitInquiry,
        source_ip: Option<String>,
    ) -> Result<InquiryReceipt, ServiceError> {
        let input = validate_submission(input, self.max_message_chars)?;

        let product = sqlx::query_as::<_, ProductRef>(
            "SELECT name FROM products WHERE site_id = $1 AND id = $2 AND status = 'published'",
        )
        .bind(site.id)
        .bind(input.product_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ServiceError::field("product_id", "Product not found"))?;

        let sku = match input.sku_id {
            Some(sku_id) => Some(
                sqlx::query_as::<_, SkuRef>(
                    "SELECT sku_code, spec, price, currency FROM skus
                     WHERE site_id = $1 AND id = $2 AND product_id = $3 AND is_active",
                )
                .bind(site.id)
                .bind(sku_id)
                .bind(input.product_id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| ServiceError::field("sku_id", "SKU does not belong to this product"))?,
            ),
            None => None,
        };

        let mut tx = self.pool.begin().await?;

        let customer = sqlx::query_as::<_, Customer>(
            "INSERT INTO customers (site_id, email, name, company, phone, country)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (site_id, lower(email)) DO UPDATE SET
                name = EXCLUDED.name,
                company = COALESCE(EXCLUDED.company, customers.company),
                phone = COALESCE(EXCLUDED.phone, customers.phone),
                country = COALESCE(EXCLUDED.country, customers.country),
                updated_at = now()
             RETURNING *",
        )
        .bind(site.id)
        .bind(&input.email)
        .bind(&input.name)
        .bind(&input.company)
        .bind(&input.phone)
        .bind(&input.country)
        .fetch_one(&mut *tx)
        .await?;

        let assigned = assignment::assign_salesperson(&mut *tx, site.id, input.product_id).await?;
        let assigned_user_id = assigned.as_ref().map(|c| c.user_id);
        let is_public = assigned.is_none();

        // A taken number inserts nothing; draw another instead of failing the customer
        let mut inserted = None;
        for _ in 0..INQUIRY_NO_ATTEMPTS {
            let inquiry_no = (self.next_inquiry_no)(Utc::now());
            let row: Option<(Uuid,)> = sqlx::query_as(
                "INSERT INTO inquiries
                    (site_id, inquiry_no, customer_id, product_id, sku_id, product_name, sku_code,
                     quantity, unit_price, currency, message, status, assigned_user_id, is_public, source_ip)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, 'pending', $12, $13, $14)
                 ON CONFLICT (inquiry_no) DO NOTHING
                 RETURNING id",
            )
            .bind(site.id)
            .bind(&inquiry_no)
            .bind(customer.id)
            .bind(input.product_id)
            .bind(input.sku_id)
            .bind(&product.name)
            .bind(sku.as_ref().map(|s| s.sku_code.clone()))
            .bind(input.quantity)
            .bind(sku.as_ref().and_then(|s| s.price))
            .bind(sku.as_ref().map(|s| s.currency.clone()))
            .bind(&input.message)
            .bind(assigned_user_id)
            .bind(is_public)
            .bind(&source_ip)
            .fetch_optional(&mut *tx)
            .await?;
            match row {
                Some((id,)) => {
                    inserted = Some(id);
                    break;
                }
                None => warn!(site_id = %site.id, "Inquiry number {} already taken, retrying", inquiry_no),
            }
        }
        let inquiry_id = inserted
            .ok_or_else(|| ServiceError::Internal("Could not allocate a unique inquiry number".to_string()))?;

        let sql = format!("{} WHERE i.id = $1", SELECT_INQUIRY);
        let inquiry = sqlx::query_as::<_, Inquiry>(&sql)
            .bind(inquiry_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(
            site_id = %site.id,
            inquiry_id = %inquiry.id,
            customer_id = %customer.id,
            assigned_user_id = ?assigned_user_id,
            "Inquiry {} submitted{}",
            inquiry.inquiry_no,
            if is_public { " to the public pool" } else { "" }
        );

        let spec = sku.map(|s| s.spec).unwrap_or(Value::Null);
        self.notifier.spawn_inquiry(notice_from(&inquiry, &site.name, spec));

        Ok(InquiryReceipt {
            id: inquiry.id,
            inquiry_no: inquiry.inquiry_no,
            status: InquiryStatus::Pending,
            created_at: inquiry.created_at,
        })
    }

    pub async fn list(
        &self,
        site_id: Uuid,
        scope: InquiryScope,
        filter: &InquiryFilter,
        listing: &ListingConfig,
    ) -> Result<Paginated<Inquiry>, ServiceError> {
        let params = filter.params();
        let page = params.page(listing);
        let orders = SortOrder::parse(params.sort.as_deref(), INQUIRY_SORT_COLUMNS, SortOrder::desc("created_at"))?;
        let status = filter.status.as_deref().map(parse_status).transpose()?;

        let mut count = QueryBuilder::<Postgres>::new(
            "SELECT COUNT(*) FROM inquiries i JOIN customers c ON c.id = i.customer_id",
        );
        push_inquiry_filters(&mut count, site_id, scope, &params, filter, status);
        let total: i64 = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let mut query = QueryBuilder::<Postgres>::new(SELECT_INQUIRY);
        push_inquiry_filters(&mut query, site_id, scope, &params, filter, status);
        query.push(SortOrder::to_sql(&orders, Some("i")));
        query.push(" LIMIT ").push_bind(page.limit());
        query.push(" OFFSET ").push_bind(page.offset());
        let items = query.build_query_as::<Inquiry>().fetch_all(&self.pool).await?;

        Ok(Paginated::new(items, total, page))
    }

    pub async fn get(&self, site_id: Uuid, scope: InquiryScope, id: Uuid) -> Result<Inquiry, ServiceError> {
        let mut query = QueryBuilder::<Postgres>::new(SELECT_INQUIRY);
        query.push(" WHERE i.site_id = ").push_bind(site_id);
        query.push(" AND i.id = ").push_bind(id);
        scope.push_sql(&mut query);
        query
            .build_query_as::<Inquiry>()
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("Inquiry '{}' not found", id)))
    }

    pub async fn update_status(
        &self,
        site_id: Uuid,
        scope: InquiryScope,
        id: Uuid,
        input: UpdateStatus,
    ) -> Result<Inquiry, ServiceError> {
        let next = parse_status(&input.status)?;
        let inquiry = self.get(site_id, scope, id).await?;
        let current = parse_status(&inquiry.status)?;
        if !current.can_transition_to(next) {
            return Err(ServiceError::Unprocessable(format!(
                "Cannot move inquiry from '{}' to '{}'",
                current.as_str(),
                next.as_str()
            )));
        }

        let result = sqlx::query(
            "UPDATE inquiries SET status = $4, updated_at = now()
             WHERE site_id = $1 AND id = $2 AND status = $3",
        )
        .bind(site_id)
        .bind(id)
        .bind(current.as_str())
        .bind(next.as_str())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(ServiceError::conflict("Inquiry status changed concurrently"));
        }

        info!(site_id = %site_id, inquiry_id = %id, "Inquiry {} moved {} -> {}", inquiry.inquiry_no, current.as_str(), next.as_str());
        self.get(site_id, InquiryScope::Site, id).await
    }

    /// Take a public-pool inquiry; only one claimant can win
    pub async fn claim(&self, site_id: Uuid, id: Uuid, user_id: Uuid) -> Result<Inquiry, ServiceError> {
        let result = sqlx::query(
            "UPDATE inquiries SET assigned_user_id = $3, is_public = FALSE, updated_at = now()
             WHERE site_id = $1 AND id = $2 AND is_public AND assigned_user_id IS NULL",
        )
        .bind(site_id)
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Distinguish a missing inquiry from one someone else already took
            self.get(site_id, InquiryScope::Site, id).await?;
            return Err(ServiceError::conflict("Inquiry has already been claimed"));
        }

        info!(site_id = %site_id, inquiry_id = %id, user_id = %user_id, "Inquiry claimed from public pool");
        self.get(site_id, InquiryScope::Site, id).await
    }

    pub async fn reassign(&self, site_id: Uuid, id: Uuid, input: Reassign) -> Result<Inquiry, ServiceError> {
        let active: Option<(bool,)> = sqlx::query_as("SELECT is_active FROM users WHERE site_id = $1 AND id = $2")
            .bind(site_id)
            .bind(input.user_id)
            .fetch_optional(&self.pool)
            .await?;
        match active {
            Some((true,)) => {}
            Some((false,)) => return Err(ServiceError::field("user_id", "User is inactive")),
            None => return Err(ServiceError::field("user_id", "User not found")),
        }

        let result = sqlx::query(
            "UPDATE inquiries SET assigned_user_id = $3, is_public = FALSE, updated_at = now()
             WHERE site_id = $1 AND id = $2",
        )
        .bind(site_id)
        .bind(id)
        .bind(input.user_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(ServiceError::not_found(format!("Inquiry '{}' not found", id)));
        }

        info!(site_id = %site_id, inquiry_id = %id, user_id = %input.user_id, "Inquiry reassigned");
        self.get(site_id, InquiryScope::Site, id).await
    }

    /// Regenerate the quotation workbook; returns the download filename and bytes
    pub async fn quotation(
        &self,
        site: &Site,
        scope: InquiryScope,
        id: Uuid,
    ) -> Result<(String, Vec<u8>), ServiceError> {
        let inquiry = self.get(site.id, scope, id).await?;

        let spec = match inquiry.sku_id {
            Some(sku_id) => sqlx::query_as::<_, (Value,)>("SELECT spec FROM skus WHERE id = $1")
                .bind(sku_id)
                .fetch_optional(&self.pool)
                .await?
                .map(|(spec,)| spec)
                .unwrap_or(Value::Null),
            None => Value::Null,
        };

        let notice = notice_from(&inquiry, &site.name, spec);
        let bytes = quotation::build_quotation(&notice).map_err(|e| {
            warn!(inquiry_id = %inquiry.id, "Quotation build failed: {}", e);
            ServiceError::Internal(format!("Failed to build quotation: {}", e))
        })?;
        Ok((quotation::quotation_filename(&inquiry.inquiry_no), bytes))
    }
}

fn push_inquiry_filters(
    qb: &mut QueryBuilder<'_, Postgres>,
    site_id: Uuid,
    scope: InquiryScope,
    params: &ListParams,
    filter: &InquiryFilter,
    status: Option<InquiryStatus>,
) {
    qb.push(" WHERE i.site_id = ").push_bind(site_id);
    scope.push_sql(qb);
    if let Some(status) = status {
        qb.push(" AND i.status = ").push_bind(status.as_str());
    }
    if let Some(is_public) = filter.is_public {
        qb.push(" AND i.is_public = ").push_bind(is_public);
    }
    if let Some(term) = params.search() {
        let pattern = like_pattern(term);
        qb.push(" AND (i.inquiry_no ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR c.email ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn submission() -> SubmitInquiry {
        SubmitInquiry {
            email: " Buyer@Example.com ".into(),
            name: " Jane Buyer ".into(),
            company: Some("  ".into()),
            phone: None,
            country: Some("DE".into()),
            product_id: Uuid::new_v4(),
            sku_id: None,
            quantity: 10,
            message: Some(" Need a quote ".into()),
        }
    }

    #[test]
    fn inquiry_no_shape() {
        let now = Utc.with_ymd_and_hms(2024, 7, 4, 9, 0, 0).unwrap();
        let no = generate_inquiry_no(now, Uuid::new_v4());
        assert!(no.starts_with("INQ-20240704-"));
        let suffix = no.rsplit('-').next().unwrap();
        assert_eq!(suffix.len(), 6);
        assert!(suffix.bytes().all(|b| INQUIRY_NO_ALPHABET.contains(&b)));
    }

    #[test]
    fn inquiry_no_is_deterministic_per_token() {
        let now = Utc.with_ymd_and_hms(2024, 7, 4, 9, 0, 0).unwrap();
        let token = Uuid::new_v4();
        assert_eq!(generate_inquiry_no(now, token), generate_inquiry_no(now, token));
        assert_eq!(generate_inquiry_no(now, Uuid::nil()), "INQ-20240704-AAAAAA");
    }

    #[test]
    fn status_transitions() {
        use InquiryStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Quoted));
        assert!(Quoted.can_transition_to(Closed));
        assert!(Pending.can_transition_to(Closed));
        assert!(!Pending.can_transition_to(Quoted));
        assert!(!Quoted.can_transition_to(Pending));
        assert!(!Closed.can_transition_to(Pending));
        assert!(!Closed.can_transition_to(Closed));
        assert!(!Processing.can_transition_to(Processing));
    }

    #[test]
    fn status_parse_round_trips_codes() {
        for status in [InquiryStatus::Pending, InquiryStatus::Processing, InquiryStatus::Quoted, InquiryStatus::Closed] {
            assert_eq!(InquiryStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(InquiryStatus::parse("Quoted"), Some(InquiryStatus::Quoted));
        assert_eq!(InquiryStatus::parse("won"), None);
    }

    #[test]
    fn submission_is_trimmed_and_normalized() {
        let clean = validate_submission(submission(), 5000).unwrap();
        assert_eq!(clean.email, "buyer@example.com");
        assert_eq!(clean.name, "Jane Buyer");
        assert_eq!(clean.company, None);
        assert_eq!(clean.message.as_deref(), Some("Need a quote"));
    }

    #[test]
    fn submission_rejects_bad_fields() {
        let mut input = submission();
        input.email = "not-an-email".into();
        input.name = "   ".into();
        input.quantity = 0;
        match validate_submission(input, 5000) {
            Err(ServiceError::Validation { field_errors, .. }) => {
                assert!(field_errors.contains_key("email"));
                assert!(field_errors.contains_key("name"));
                assert!(field_errors.contains_key("quantity"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn submission_caps_message_length() {
        let mut input = submission();
        input.message = Some("x".repeat(11));
        assert!(validate_submission(input.clone(), 10).is_err());
        input.message = Some("x".repeat(10));
        assert!(validate_submission(input, 10).is_ok());
    }

    #[test]
    fn scope_follows_permissions() {
        let user = Uuid::new_v4();
        let dept = Uuid::new_v4();
        assert_eq!(InquiryScope::for_user(user, Some(dept), true, true), InquiryScope::Site);
        assert_eq!(
            InquiryScope::for_user(user, Some(dept), false, true),
            InquiryScope::Department { department_id: dept, user_id: user }
        );
        assert_eq!(InquiryScope::for_user(user, None, false, true), InquiryScope::Own { user_id: user });
        assert_eq!(InquiryScope::for_user(user, Some(dept), false, false), InquiryScope::Own { user_id: user });
    }

    #[test]
    fn scope_sql_always_includes_public_pool() {
        let user = Uuid::new_v4();
        let mut qb = QueryBuilder::<Postgres>::new("SELECT 1 FROM inquiries i WHERE TRUE");
        InquiryScope::Own { user_id: user }.push_sql(&mut qb);
        assert!(qb.sql().contains("i.is_public OR i.assigned_user_id = $1"));

        let mut qb = QueryBuilder::<Postgres>::new("SELECT 1 FROM inquiries i WHERE TRUE");
        InquiryScope::Site.push_sql(&mut qb);
        assert_eq!(qb.sql(), "SELECT 1 FROM inquiries i WHERE TRUE");
    }
}
