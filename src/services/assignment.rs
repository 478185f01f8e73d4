//! Round-robin salesperson assignment for new inquiries.
//!
//! A product's master categories are the root ancestors of the categories it
//! is linked to. Candidates are the auto-assign responsibility rows for those
//! roots whose user is active. The row assigned least recently wins (never
//! assigned sorts first, ties go to the lowest row id) and its
//! `last_assigned_at` is stamped, all inside the caller's transaction.

use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use tracing::debug;
use uuid::Uuid;

use super::ServiceError;

/// Depth cap on the ancestor walk
const MAX_CATEGORY_DEPTH: i32 = 32;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Candidate {
    pub responsibility_id: i64,
    pub user_id: Uuid,
    pub last_assigned_at: Option<DateTime<Utc>>,
}

/// Least recently assigned candidate; `None` sorts before any timestamp
pub fn select_salesperson(candidates: &[Candidate]) -> Option<&Candidate> {
    candidates
        .iter()
        .min_by_key(|c| (c.last_assigned_at, c.responsibility_id))
}

/// Root ancestors of every category linked to the product
pub async fn master_categories(conn: &mut PgConnection, site_id: Uuid, product_id: Uuid) -> Result<Vec<Uuid>, ServiceError> {
    let rows: Vec<(Uuid,)> = sqlx::query_as(
        "WITH RECURSIVE chain AS (
            SELECT c.id, c.parent_id, 0 AS depth
            FROM categories c
            JOIN product_categories pc ON pc.category_id = c.id
            WHERE pc.product_id = $1 AND c.site_id = $2
            UNION ALL
            SELECT p.id, p.parent_id, chain.depth + 1
            FROM categories p
            JOIN chain ON p.id = chain.parent_id
            WHERE chain.depth < $3
        )
        SELECT DISTINCT id FROM chain WHERE parent_id IS NULL ORDER BY id",
    )
    .bind(product_id)
    .bind(site_id)
    .bind(MAX_CATEGORY_DEPTH)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Lock and return the eligible responsibility rows for the given master categories
pub async fn lock_candidates(
    conn: &mut PgConnection,
    site_id: Uuid,
    master_category_ids: &[Uuid],
) -> Result<Vec<Candidate>, ServiceError> {
    if master_category_ids.is_empty() {
        return Ok(Vec::new());
    }
    let candidates = sqlx::query_as::<_, Candidate>(
        "SELECT sr.id AS responsibility_id, sr.user_id, sr.last_assigned_at
         FROM sales_responsibilities sr
         JOIN users u ON u.id = sr.user_id
         WHERE sr.site_id = $1
           AND sr.master_category_id = ANY($2)
           AND sr.is_auto_assign
           AND u.is_active
         ORDER BY sr.id
         FOR UPDATE OF sr",
    )
    .bind(site_id)
    .bind(master_category_ids)
    .fetch_all(&mut *conn)
    .await?;
    Ok(candidates)
}

/// Wall-clock time of the stamp, not the transaction start: a submission that
/// waited on the row lock must sort after the one that held it.
const STAMP_ASSIGNMENT: &str = "UPDATE sales_responsibilities SET last_assigned_at = clock_timestamp() WHERE id = $1";

/// Pick and stamp the next salesperson for a product. `None` means the
/// inquiry belongs in the public pool.
pub async fn assign_salesperson(
    conn: &mut PgConnection,
    site_id: Uuid,
    product_id: Uuid,
) -> Result<Option<Candidate>, ServiceError> {
    let masters = master_categories(&mut *conn, site_id, product_id).await?;
    let candidates = lock_candidates(&mut *conn, site_id, &masters).await?;

    let chosen = match select_salesperson(&candidates) {
        Some(candidate) => candidate.clone(),
        None => {
            debug!(site_id = %site_id, product_id = %product_id, masters = masters.len(), "No salesperson candidates");
            return Ok(None);
        }
    };

    sqlx::query(STAMP_ASSIGNMENT)
        .bind(chosen.responsibility_id)
        .execute(&mut *conn)
        .await?;

    debug!(
        site_id = %site_id,
        product_id = %product_id,
        user_id = %chosen.user_id,
        candidates = candidates.len(),
        "Assigned salesperson"
    );
    Ok(Some(chosen))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn candidate(id: i64, last: Option<(u32, u32)>) -> Candidate {
        Candidate {
            responsibility_id: id,
            user_id: Uuid::new_v4(),
            last_assigned_at: last.map(|(h, m)| Utc.with_ymd_and_hms(2024, 5, 1, h, m, 0).unwrap()),
        }
    }

    #[test]
    fn empty_pool_has_no_pick() {
        assert!(select_salesperson(&[]).is_none());
    }

    #[test]
    fn never_assigned_goes_first() {
        let candidates = vec![candidate(1, Some((8, 0))), candidate(2, None), candidate(3, Some((7, 0)))];
        assert_eq!(select_salesperson(&candidates).unwrap().responsibility_id, 2);
    }

    #[test]
    fn oldest_assignment_wins() {
        let candidates = vec![candidate(1, Some((9, 30))), candidate(2, Some((9, 0))), candidate(3, Some((10, 0)))];
        assert_eq!(select_salesperson(&candidates).unwrap().responsibility_id, 2);
    }

    #[test]
    fn ties_go_to_lowest_row_id() {
        let candidates = vec![candidate(7, None), candidate(4, None), candidate(9, None)];
        assert_eq!(select_salesperson(&candidates).unwrap().responsibility_id, 4);

        let candidates = vec![candidate(12, Some((9, 0))), candidate(5, Some((9, 0)))];
        assert_eq!(select_salesperson(&candidates).unwrap().responsibility_id, 5);
    }

    #[test]
    fn stamping_rotates_through_the_pool() {
        let mut pool = vec![candidate(1, None), candidate(2, None), candidate(3, None)];
        let mut order = Vec::new();
        for minute in 0..6u32 {
            let picked = select_salesperson(&pool).unwrap().responsibility_id;
            order.push(picked);
            let row = pool.iter_mut().find(|c| c.responsibility_id == picked).unwrap();
            row.last_assigned_at = Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, minute, 0).unwrap());
        }
        assert_eq!(order, vec![1, 2, 3, 1, 2, 3]);
    }

    #[test]
    fn stamp_uses_wall_clock_not_transaction_start() {
        assert!(STAMP_ASSIGNMENT.contains("clock_timestamp()"));
        assert!(!STAMP_ASSIGNMENT.contains("now()"));
    }
}
