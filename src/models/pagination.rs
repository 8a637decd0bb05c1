//! Pagination primitives for snippet list endpoints.

use serde::{Deserialize, Serialize};

/// Pagination query parameters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Pagination {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl Pagination {
    /// Maximum items per page.
    const MAX_PER_PAGE: i64 = 200;

    /// Default items per page.
    const DEFAULT_PER_PAGE: i64 = 50;

    pub fn limit(&self) -> i64 {
        self.per_page
            .unwrap_or(Self::DEFAULT_PER_PAGE)
            .clamp(1, Self::MAX_PER_PAGE)
    }

    pub fn offset(&self) -> i64 {
        (self.current_page() - 1) * self.limit()
    }

    pub fn current_page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    /// Slice an already-filtered list down to the requested page.
    pub fn paginate<T: Serialize>(&self, items: Vec<T>) -> PagedResult<T> {
        let total = items.len() as i64;
        let page: Vec<T> = items
            .into_iter()
            .skip(self.offset() as usize)
            .take(self.limit() as usize)
            .collect();
        PagedResult::new(page, total, self)
    }
}

/// Paged result envelope returned by list endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct PagedResult<T: Serialize> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

impl<T: Serialize> PagedResult<T> {
    pub fn new(items: Vec<T>, total: i64, pagination: &Pagination) -> Self {
        let per_page = pagination.limit();
        let total_pages = (total + per_page - 1) / per_page;
        Self {
            items,
            total,
            page: pagination.current_page(),
            per_page,
            total_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_defaults() {
        let p = Pagination::default();
        assert_eq!(p.limit(), 50);
        assert_eq!(p.offset(), 0);
        assert_eq!(p.current_page(), 1);
    }

    #[test]
    fn pagination_clamps_per_page() {
        let p = Pagination {
            page: Some(1),
            per_page: Some(5000),
        };
        assert_eq!(p.limit(), 200);
    }

    #[test]
    fn paginate_slices_items() {
        let p = Pagination {
            page: Some(2),
            per_page: Some(2),
        };
        let result = p.paginate(vec![1, 2, 3, 4, 5]);
        assert_eq!(result.items, vec![3, 4]);
        assert_eq!(result.total, 5);
        assert_eq!(result.total_pages, 3);
        assert_eq!(result.page, 2);
    }

    #[test]
    fn paginate_past_end_is_empty() {
        let p = Pagination {
            page: Some(9),
            per_page: Some(10),
        };
        let result = p.paginate(vec!["a"]);
        assert!(result.items.is_empty());
        assert_eq!(result.total_pages, 1);
    }
}
