//! Slicing of ordered recommendation sequences
//!
//! Both addressing modes are pure index slices over the stored order. Ranges
//! past the end are clipped, so an out-of-range page is an empty slice.

use crate::models::{PageRange, PageSelector};

/// Items per page of a paginated query
pub const PAGE_SIZE: usize = 10;

/// Items per block of a range query
pub const RANGE_PAGE_SIZE: usize = 100;

fn clipped<T>(items: &[T], start: usize, end: usize) -> &[T] {
    let start = start.min(items.len());
    let end = end.min(items.len()).max(start);
    &items[start..end]
}

/// `items[(page-1)*10 .. (page-1)*10 + 10]`, clipped; `page` is 1-based
pub fn paginate<T>(items: &[T], page: usize) -> &[T] {
    let start = page.saturating_sub(1).saturating_mul(PAGE_SIZE);
    clipped(items, start, start.saturating_add(PAGE_SIZE))
}

/// `items[(start-1)*100 .. (end-1)*100 + 100]`, clipped; `None` is everything
pub fn range<T>(items: &[T], pages: Option<PageRange>) -> &[T] {
    match pages {
        None => items,
        Some(PageRange { start, end }) => {
            let from = start.saturating_sub(1).saturating_mul(RANGE_PAGE_SIZE);
            let to = end
                .saturating_sub(1)
                .saturating_mul(RANGE_PAGE_SIZE)
                .saturating_add(RANGE_PAGE_SIZE);
            clipped(items, from, to)
        }
    }
}

pub fn select<T>(items: &[T], selector: PageSelector) -> &[T] {
    match selector {
        PageSelector::Page(page) => paginate(items, page),
        PageSelector::Range(pages) => range(items, pages),
    }
}
