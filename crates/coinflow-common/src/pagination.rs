//! Limit/offset pagination shared by read queries
//!
//! Callers pass a `limit` (1 to 100, default 10) and an `offset` (≥ 0, default 0).
//! Responses carry [`PageMetadata`] derived from the parameters and the total
//! number of matching rows.

use serde::{Deserialize, Serialize};

use crate::error::{CoinflowError, Result};

/// Default page size when the caller gives none
pub const DEFAULT_LIMIT: i64 = 10;

/// Largest page a caller may request
pub const MAX_LIMIT: i64 = 100;

/// Pagination request parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageParams {
    pub limit: i64,
    pub offset: i64,
}

impl Default for PageParams {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

impl PageParams {
    /// Build parameters, rejecting out-of-range values instead of clamping them
    pub fn new(limit: Option<i64>, offset: Option<i64>) -> Result<Self> {
        let params = Self {
            limit: limit.unwrap_or(DEFAULT_LIMIT),
            offset: offset.unwrap_or(0),
        };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_LIMIT).contains(&self.limit) {
            return Err(CoinflowError::Pagination(format!(
                "limit must be between 1 and {}, got {}",
                MAX_LIMIT, self.limit
            )));
        }
        if self.offset < 0 {
            return Err(CoinflowError::Pagination(format!(
                "offset must be non-negative, got {}",
                self.offset
            )));
        }
        Ok(())
    }

    /// 1-indexed page number implied by the offset
    pub fn page(&self) -> i64 {
        self.offset / self.limit + 1
    }
}

/// Page metadata returned alongside query results
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMetadata {
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub pages: i64,
    pub has_next: bool,
}

impl PageMetadata {
    pub fn new(params: &PageParams, total: i64) -> Self {
        let pages = if total == 0 {
            0
        } else {
            (total + params.limit - 1) / params.limit
        };

        Self {
            total,
            page: params.page(),
            page_size: params.limit,
            pages,
            has_next: params.offset + params.limit < total,
        }
    }
}
