//! Paging and ordering for list endpoints.
//!
//! Sort specs arrive as `"created_at desc,name"` or `"-created_at"`. Columns
//! are checked against a per-endpoint whitelist before they reach SQL, so the
//! rendered ORDER BY only ever contains known identifiers.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ListingConfig;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ListingError {
    #[error("Cannot sort by '{0}'")]
    InvalidSortColumn(String),

    #[error("Invalid sort direction '{0}'")]
    InvalidSortDirection(String),
}

/// Common query-string parameters for list endpoints
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub sort: Option<String>,
    pub q: Option<String>,
}

impl ListParams {
    pub fn page(&self, config: &ListingConfig) -> Page {
        Page::new(self.page, self.page_size, config)
    }

    /// Trimmed search term, `None` when blank
    pub fn search(&self) -> Option<&str> {
        self.q.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub page_size: u32,
}

impl Page {
    pub fn new(page: Option<u32>, page_size: Option<u32>, config: &ListingConfig) -> Self {
        let page = page.filter(|p| *p >= 1).unwrap_or(1);
        let requested = page_size.filter(|s| *s >= 1).unwrap_or(config.default_page_size);
        let page_size = if requested > config.max_page_size {
            tracing::debug!("Page size {} exceeds max {}, capping", requested, config.max_page_size);
            config.max_page_size
        } else {
            requested
        };
        Self { page, page_size }
    }

    pub fn limit(&self) -> i64 {
        self.page_size as i64
    }

    pub fn offset(&self) -> i64 {
        (self.page as i64 - 1) * self.page_size as i64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn to_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortOrder {
    pub column: &'static str,
    pub direction: SortDirection,
}

impl SortOrder {
    pub const fn asc(column: &'static str) -> Self {
        Self { column, direction: SortDirection::Asc }
    }

    pub const fn desc(column: &'static str) -> Self {
        Self { column, direction: SortDirection::Desc }
    }

    /// Parse a sort spec against the allowed columns, falling back to `default`
    pub fn parse(
        spec: Option<&str>,
        allowed: &[&'static str],
        default: SortOrder,
    ) -> Result<Vec<SortOrder>, ListingError> {
        let spec = match spec.map(str::trim).filter(|s| !s.is_empty()) {
            Some(s) => s,
            None => return Ok(vec![default]),
        };

        let mut out = Vec::new();
        for part in spec.split(',') {
            let trimmed = part.trim();
            if trimmed.is_empty() {
                continue;
            }
            let mut it = trimmed.split_whitespace();
            let raw_column = it.next().unwrap_or_default();
            let (raw_column, mut direction) = match raw_column.strip_prefix('-') {
                Some(col) => (col, SortDirection::Desc),
                None => (raw_column, SortDirection::Asc),
            };
            if let Some(dir) = it.next() {
                direction = match dir.to_ascii_lowercase().as_str() {
                    "asc" => SortDirection::Asc,
                    "desc" => SortDirection::Desc,
                    other => return Err(ListingError::InvalidSortDirection(other.to_string())),
                };
            }
            let column = allowed
                .iter()
                .copied()
                .find(|c| c.eq_ignore_ascii_case(raw_column))
                .ok_or_else(|| ListingError::InvalidSortColumn(raw_column.to_string()))?;
            out.push(SortOrder { column, direction });
        }

        if out.is_empty() {
            out.push(default);
        }
        Ok(out)
    }

    /// Render `ORDER BY` with an optional table alias and a stable id tiebreak
    pub fn to_sql(orders: &[SortOrder], alias: Option<&str>) -> String {
        let prefix = alias.map(|a| format!("{}.", a)).unwrap_or_default();
        let mut parts: Vec<String> = orders
            .iter()
            .map(|o| format!("{}{} {}", prefix, o.column, o.direction.to_sql()))
            .collect();
        if !orders.iter().any(|o| o.column == "id") {
            parts.push(format!("{}id ASC", prefix));
        }
        format!(" ORDER BY {}", parts.join(", "))
    }
}

/// One page of results with the unpaged total
#[derive(Debug, Clone, Serialize)]
pub struct Paginated<T: Serialize> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub page_size: u32,
}

impl<T: Serialize> Paginated<T> {
    pub fn new(items: Vec<T>, total: i64, page: Page) -> Self {
        Self { items, total, page: page.page, page_size: page.page_size }
    }
}

/// Escape LIKE metacharacters and wrap in wildcards
pub fn like_pattern(term: &str) -> String {
    let escaped = term.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
    format!("%{}%", escaped)
}
