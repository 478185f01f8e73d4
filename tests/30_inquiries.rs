mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use b2b_api::database::models::{Category, Site};
use b2b_api::notify::{LogMailer, Notifier};
use b2b_api::services::assignment;
use b2b_api::services::catalog_service::{CreateCategory, CreateProduct, UpdateCategory};
use b2b_api::services::directory_service::{CreateUser, UpdateUser};
use b2b_api::services::inquiry_service::{generate_inquiry_no, InquiryFilter, InquiryScope, SubmitInquiry};
use b2b_api::services::sales_service::{CreateResponsibility, UpdateResponsibility};
use b2b_api::services::site_service::CreateSite;
use b2b_api::services::{
    AuthService, CatalogService, DirectoryService, InquiryService, SalesService, ServiceError, SiteCache,
    SiteService,
};

/// Fresh site plus the services the scenarios drive
struct Fixture {
    pool: PgPool,
    site: Site,
    catalog: CatalogService,
    directory: DirectoryService,
    sales: SalesService,
    inquiries: InquiryService,
}

impl Fixture {
    async fn new(pool: PgPool) -> Result<Self> {
        let sites = SiteService::new(pool.clone(), Arc::new(SiteCache::new(Duration::from_secs(60))));
        let tag = Uuid::new_v4().simple().to_string();
        let site = sites
            .create(CreateSite {
                name: format!("Site {}", &tag[..8]),
                domain: format!("t{}.example.com", tag),
                aliases: Vec::new(),
                contact_email: None,
            })
            .await?;
        Ok(Self {
            catalog: CatalogService::new(pool.clone()),
            directory: DirectoryService::new(pool.clone()),
            sales: SalesService::new(pool.clone()),
            inquiries: inquiry_service(pool.clone()),
            pool,
            site,
        })
    }

    async fn salesperson(&self, name: &str) -> Result<Uuid> {
        let detail = self
            .directory
            .create_user(
                self.site.id,
                CreateUser {
                    email: format!("{}@{}", name.to_lowercase(), self.site.domain),
                    name: name.to_string(),
                    password: "correct horse battery".to_string(),
                    phone: None,
                    department_id: None,
                    role_ids: Vec::new(),
                    is_super_admin: false,
                },
            )
            .await?;
        Ok(detail.user.id)
    }

    async fn category(&self, slug: &str, parent_id: Option<Uuid>) -> Result<Category> {
        Ok(self
            .catalog
            .create_category(
                self.site.id,
                CreateCategory {
                    name: slug.to_string(),
                    slug: slug.to_string(),
                    parent_id,
                    description: None,
                    image_url: None,
                    sort_order: 0,
                    is_active: true,
                },
            )
            .await?)
    }

    async fn product(&self, slug: &str, category_ids: Vec<Uuid>) -> Result<Uuid> {
        let detail = self
            .catalog
            .create_product(
                self.site.id,
                CreateProduct {
                    name: slug.to_string(),
                    slug: slug.to_string(),
                    template_id: None,
                    spu_code: None,
                    summary: None,
                    description: None,
                    main_image_url: None,
                    gallery: Vec::new(),
                    attributes: json!({}),
                    status: Some("published".to_string()),
                    sort_order: 0,
                    category_ids,
                },
            )
            .await?;
        Ok(detail.product.id)
    }

    async fn responsible(&self, user_id: Uuid, category_id: Uuid, is_auto_assign: bool) -> Result<i64> {
        let row = self
            .sales
            .create(
                self.site.id,
                CreateResponsibility {
                    user_id,
                    master_category_id: category_id,
                    is_auto_assign,
                },
            )
            .await?;
        Ok(row.id)
    }

    async fn submit(&self, product_id: Uuid) -> Result<Uuid> {
        Ok(submit_with(&self.inquiries, &self.site, product_id).await?.0)
    }

    async fn assignee(&self, inquiry_id: Uuid) -> Result<Option<Uuid>> {
        let inquiry = self.inquiries.get(self.site.id, InquiryScope::Site, inquiry_id).await?;
        Ok(inquiry.assigned_user_id)
    }
}

fn inquiry_service(pool: PgPool) -> InquiryService {
    let config = common::test_config();
    let notifier = Arc::new(Notifier::new(Arc::new(LogMailer), &config.inquiry));
    InquiryService::new(pool, notifier, config.inquiry.max_message_chars)
}

async fn submit_with(
    service: &InquiryService,
    site: &Site,
    product_id: Uuid,
) -> Result<(Uuid, String), ServiceError> {
    let receipt = service
        .submit(
            site,
            SubmitInquiry {
                email: "buyer@customer.example".to_string(),
                name: "Pat Buyer".to_string(),
                company: Some("Buyer Co".to_string()),
                phone: None,
                country: None,
                product_id,
                sku_id: None,
                quantity: 10,
                message: Some("Please quote".to_string()),
            },
            Some("203.0.113.7".to_string()),
        )
        .await?;
    Ok((receipt.id, receipt.inquiry_no))
}

#[tokio::test]
async fn auto_assignment_rotates_between_salespeople() -> Result<()> {
    let Some(pool) = common::test_database().await? else { return Ok(()) };
    let fx = Fixture::new(pool).await?;

    let root = fx.category("metals", None).await?;
    let leaf = fx.category("copper", Some(root.id)).await?;
    let product = fx.product("copper-wire", vec![leaf.id]).await?;
    let alice = fx.salesperson("Alice").await?;
    let bob = fx.salesperson("Bob").await?;
    fx.responsible(alice, root.id, true).await?;
    fx.responsible(bob, root.id, true).await?;

    let mut assignees = Vec::new();
    for _ in 0..3 {
        let id = fx.submit(product).await?;
        assignees.push(fx.assignee(id).await?);
    }

    // Never-assigned rows go first by row id, then least recently assigned
    assert_eq!(assignees, vec![Some(alice), Some(bob), Some(alice)]);
    Ok(())
}

#[tokio::test]
async fn inactive_and_manual_rows_are_skipped() -> Result<()> {
    let Some(pool) = common::test_database().await? else { return Ok(()) };
    let fx = Fixture::new(pool).await?;

    let root = fx.category("plastics", None).await?;
    let product = fx.product("pvc-pipe", vec![root.id]).await?;
    let departed = fx.salesperson("Departed").await?;
    let manual = fx.salesperson("Manual").await?;
    let active = fx.salesperson("Active").await?;
    fx.responsible(departed, root.id, true).await?;
    let manual_row = fx.responsible(manual, root.id, true).await?;
    fx.responsible(active, root.id, true).await?;

    fx.directory
        .update_user(
            fx.site.id,
            departed,
            UpdateUser {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await?;
    fx.sales
        .update(fx.site.id, manual_row, UpdateResponsibility { is_auto_assign: false })
        .await?;

    for _ in 0..2 {
        let id = fx.submit(product).await?;
        assert_eq!(fx.assignee(id).await?, Some(active));
    }
    Ok(())
}

#[tokio::test]
async fn uncategorized_product_goes_to_public_pool() -> Result<()> {
    let Some(pool) = common::test_database().await? else { return Ok(()) };
    let fx = Fixture::new(pool).await?;

    let root = fx.category("textiles", None).await?;
    let seller = fx.salesperson("Seller").await?;
    fx.responsible(seller, root.id, true).await?;
    let product = fx.product("loose-sample", Vec::new()).await?;

    let id = fx.submit(product).await?;
    let inquiry = fx.inquiries.get(fx.site.id, InquiryScope::Site, id).await?;
    assert!(inquiry.is_public);
    assert_eq!(inquiry.assigned_user_id, None);
    assert_eq!(inquiry.status, "pending");
    Ok(())
}

#[tokio::test]
async fn second_claim_is_a_conflict() -> Result<()> {
    let Some(pool) = common::test_database().await? else { return Ok(()) };
    let fx = Fixture::new(pool).await?;

    let product = fx.product("unowned", Vec::new()).await?;
    let first = fx.salesperson("First").await?;
    let second = fx.salesperson("Second").await?;
    let id = fx.submit(product).await?;

    let claimed = fx.inquiries.claim(fx.site.id, id, first).await?;
    assert_eq!(claimed.assigned_user_id, Some(first));
    assert!(!claimed.is_public);

    let err = fx.inquiries.claim(fx.site.id, id, second).await.unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)), "got {:?}", err);
    assert_eq!(fx.assignee(id).await?, Some(first));
    Ok(())
}

#[tokio::test]
async fn own_scope_hides_other_salespeoples_inquiries() -> Result<()> {
    let Some(pool) = common::test_database().await? else { return Ok(()) };
    let fx = Fixture::new(pool).await?;

    let product = fx.product("shared-item", Vec::new()).await?;
    let owner = fx.salesperson("Owner").await?;
    let other = fx.salesperson("Other").await?;
    let claimed = fx.submit(product).await?;
    let pooled = fx.submit(product).await?;
    fx.inquiries.claim(fx.site.id, claimed, owner).await?;

    let own = InquiryScope::Own { user_id: other };
    let err = fx.inquiries.get(fx.site.id, own, claimed).await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)), "got {:?}", err);
    fx.inquiries.get(fx.site.id, own, pooled).await?;

    let config = common::test_config();
    let listed = fx.inquiries.list(fx.site.id, own, &InquiryFilter::default(), &config.listing).await?;
    let ids: Vec<Uuid> = listed.items.iter().map(|i| i.id).collect();
    assert_eq!(ids, vec![pooled]);
    assert_eq!(listed.total, 1);

    let mine = InquiryScope::Own { user_id: owner };
    fx.inquiries.get(fx.site.id, mine, claimed).await?;
    Ok(())
}

#[tokio::test]
async fn waiting_assignment_stamps_after_the_lock_holder() -> Result<()> {
    let Some(pool) = common::test_database().await? else { return Ok(()) };
    let fx = Fixture::new(pool).await?;

    let root = fx.category("chemicals", None).await?;
    let product = fx.product("solvent", vec![root.id]).await?;
    let seller = fx.salesperson("Solo").await?;
    let row = fx.responsible(seller, root.id, true).await?;

    // Pin the older transaction's start time before the newer one runs
    let mut older = fx.pool.begin().await?;
    sqlx::query("SELECT 1").execute(&mut *older).await?;
    tokio::time::sleep(Duration::from_millis(20)).await;

    let mut newer = fx.pool.begin().await?;
    assignment::assign_salesperson(&mut *newer, fx.site.id, product).await?;
    newer.commit().await?;
    let (first_stamp,): (Option<DateTime<Utc>>,) =
        sqlx::query_as("SELECT last_assigned_at FROM sales_responsibilities WHERE id = $1")
            .bind(row)
            .fetch_one(&fx.pool)
            .await?;

    assignment::assign_salesperson(&mut *older, fx.site.id, product).await?;
    older.commit().await?;
    let (second_stamp,): (Option<DateTime<Utc>>,) =
        sqlx::query_as("SELECT last_assigned_at FROM sales_responsibilities WHERE id = $1")
            .bind(row)
            .fetch_one(&fx.pool)
            .await?;

    assert!(second_stamp > first_stamp, "{:?} should follow {:?}", second_stamp, first_stamp);
    Ok(())
}

#[tokio::test]
async fn taken_inquiry_number_is_redrawn() -> Result<()> {
    let Some(pool) = common::test_database().await? else { return Ok(()) };
    let fx = Fixture::new(pool.clone()).await?;
    let product = fx.product("retry-item", Vec::new()).await?;

    let (_, taken) = submit_with(&fx.inquiries, &fx.site, product).await?;

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let repeated = taken.clone();
    let colliding = inquiry_service(pool).with_number_source(Arc::new(move |now| {
        if counter.fetch_add(1, Ordering::SeqCst) < 2 {
            repeated.clone()
        } else {
            generate_inquiry_no(now, Uuid::new_v4())
        }
    }));

    let (_, fresh) = submit_with(&colliding, &fx.site, product).await?;
    assert_ne!(fresh, taken);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    Ok(())
}

#[tokio::test]
async fn persistent_number_collision_fails_cleanly() -> Result<()> {
    let Some(pool) = common::test_database().await? else { return Ok(()) };
    let fx = Fixture::new(pool.clone()).await?;
    let product = fx.product("stuck-item", Vec::new()).await?;

    let (_, taken) = submit_with(&fx.inquiries, &fx.site, product).await?;
    let stuck = inquiry_service(pool).with_number_source(Arc::new(move |_| taken.clone()));

    let err = submit_with(&stuck, &fx.site, product).await.unwrap_err();
    assert!(matches!(err, ServiceError::Internal(_)), "got {:?}", err);
    Ok(())
}

#[tokio::test]
async fn login_is_refused_on_a_deactivated_site() -> Result<()> {
    let Some(pool) = common::test_database().await? else { return Ok(()) };
    let fx = Fixture::new(pool.clone()).await?;
    fx.salesperson("Locked").await?;
    let email = format!("locked@{}", fx.site.domain);

    let auth = AuthService::new(pool.clone());
    let secret = "integration-test-secret";
    auth.login(fx.site.id, &email, "correct horse battery", secret, 1).await?;

    let sites = SiteService::new(pool, Arc::new(SiteCache::new(Duration::from_secs(60))));
    sites.deactivate(fx.site.id).await?;

    let err = auth
        .login(fx.site.id, &email, "correct horse battery", secret, 1)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Unauthorized(_)), "got {:?}", err);
    Ok(())
}

#[tokio::test]
async fn root_with_responsibilities_cannot_be_demoted() -> Result<()> {
    let Some(pool) = common::test_database().await? else { return Ok(()) };
    let fx = Fixture::new(pool).await?;

    let staffed = fx.category("staffed", None).await?;
    let other_root = fx.category("other-root", None).await?;
    let unstaffed = fx.category("unstaffed", None).await?;
    let seller = fx.salesperson("Keeper").await?;
    fx.responsible(seller, staffed.id, true).await?;

    let move_under = |parent: Uuid| UpdateCategory {
        parent_id: Some(Some(parent)),
        ..Default::default()
    };

    let err = fx
        .catalog
        .update_category(fx.site.id, staffed.id, move_under(other_root.id))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)), "got {:?}", err);
    let unchanged = fx.catalog.get_category(fx.site.id, staffed.id).await?;
    assert_eq!(unchanged.parent_id, None);

    let moved = fx
        .catalog
        .update_category(fx.site.id, unstaffed.id, move_under(other_root.id))
        .await?;
    assert_eq!(moved.parent_id, Some(other_root.id));
    Ok(())
}
