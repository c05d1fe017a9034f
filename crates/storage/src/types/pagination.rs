//! Page requests and the count-to-window pager.
//!
//! Stores first count the matching records, then ask [`build_page`] for the
//! skip/limit window to apply to the page query. The two round trips are
//! not an atomic snapshot.

use serde::{Deserialize, Serialize};

/// A requested page, numbered from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    /// Page number, starting at 1.
    pub number: u64,
    /// Items per page.
    pub per_page: u64,
}

impl PageRequest {
    /// Creates a page request.
    pub fn new(number: u64, per_page: u64) -> Self {
        Self { number, per_page }
    }
}

/// The window a store applies to its page query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PageWindow {
    /// Whether a limit/offset applies at all.
    pub has_page: bool,
    /// Maximum items to return.
    pub per_page: u64,
    /// Items to skip.
    pub skip: u64,
}

impl PageWindow {
    /// Returns true if the window starts past the last matching item.
    pub fn is_past_end(&self, total: u64) -> bool {
        self.has_page && self.skip >= total
    }
}

/// Converts a total count and a page request into a skip/limit window.
///
/// No page, or a page size of zero, means "return everything". Page number
/// zero is treated as the first page.
pub fn build_page(total: u64, page: Option<&PageRequest>) -> PageWindow {
    let Some(page) = page else {
        return PageWindow::default();
    };
    if page.per_page == 0 {
        return PageWindow::default();
    }

    let number = page.number.max(1);
    let skip = page.per_page.saturating_mul(number - 1);
    tracing::trace!(total, number, per_page = page.per_page, skip, "built page window");

    PageWindow {
        has_page: true,
        per_page: page.per_page,
        skip,
    }
}
