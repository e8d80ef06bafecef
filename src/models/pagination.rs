use serde::{Deserialize, Serialize};

/// Pagination parameters for list endpoints
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PaginationParams {
    /// Page number (1-indexed, defaults to 1)
    pub page: Option<i64>,
    /// Items per page (defaults to 20, max 100)
    pub per_page: Option<i64>,
    /// Search query for filtering
    pub search: Option<String>,
}

impl PaginationParams {
    /// Default page size
    const DEFAULT_PER_PAGE: i64 = 20;
    /// Maximum page size
    const MAX_PER_PAGE: i64 = 100;

    /// Get the validated page number (1-indexed)
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    /// Get the validated per_page value
    pub fn per_page(&self) -> i64 {
        self.per_page
            .unwrap_or(Self::DEFAULT_PER_PAGE)
            .clamp(1, Self::MAX_PER_PAGE)
    }

    /// Calculate the offset for SQL queries
    pub fn offset(&self) -> i64 {
        (self.page() - 1) * self.per_page()
    }
}

/// Paginated response wrapper
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedResponse<T> {
    /// Items for the current page
    pub items: Vec<T>,
    /// Total number of items across all pages
    pub total: i64,
    /// Current page number (1-indexed)
    pub page: i64,
    /// Items per page
    pub per_page: i64,
    /// Total number of pages
    pub total_pages: i64,
}

impl<T> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, total: i64, params: &PaginationParams) -> Self {
        let per_page = params.per_page();
        Self {
            items,
            total,
            page: params.page(),
            per_page,
            total_pages: (total + per_page - 1) / per_page,
        }
    }
}
