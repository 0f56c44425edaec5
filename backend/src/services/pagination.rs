//! Pagination metadata returned alongside list responses.

use serde::Serialize;

use crate::db::models::PageRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: u32,
    pub total_pages: u64,
    pub total_items: u64,
    pub items_per_page: u32,
    pub has_next_page: bool,
    pub has_prev_page: bool,
}

impl Pagination {
    pub fn new(page: PageRequest, total_items: u64) -> Self {
        let total_pages = total_items.div_ceil(page.limit() as u64);
        Self {
            current_page: page.page(),
            total_pages,
            total_items,
            items_per_page: page.limit(),
            has_next_page: (page.page() as u64) < total_pages,
            has_prev_page: page.page() > 1,
        }
    }
}
