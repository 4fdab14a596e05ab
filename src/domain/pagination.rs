//! Page arithmetic for feeds.
//!
//! A trailing page with `orphans` items or fewer is folded into the page
//! before it. Out-of-range page numbers degrade to the nearest valid page.

use serde::Serialize;

/// Posts per page when nothing is configured.
pub const DEFAULT_PER_PAGE: usize = 10;
/// Largest trailing page that is merged into its predecessor.
pub const DEFAULT_ORPHANS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paginator {
    per_page: usize,
    orphans: usize,
}

/// The slice of a listing that makes up one resolved page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub number: usize,
    pub num_pages: usize,
    pub offset: usize,
    pub limit: usize,
}

impl Default for Paginator {
    fn default() -> Self {
        Self::new(DEFAULT_PER_PAGE, DEFAULT_ORPHANS)
    }
}

impl Paginator {
    /// `per_page` of 0 is treated as 1.
    pub fn new(per_page: usize, orphans: usize) -> Self {
        Self {
            per_page: per_page.max(1),
            orphans,
        }
    }

    pub fn per_page(&self) -> usize {
        self.per_page
    }

    pub fn orphans(&self) -> usize {
        self.orphans
    }

    /// Always at least 1: an empty listing still has one (empty) page.
    pub fn num_pages(&self, count: usize) -> usize {
        let hits = count.saturating_sub(self.orphans).max(1);
        hits.div_ceil(self.per_page)
    }

    /// Resolves `requested` against `count` items. Below 1 clamps to the first
    /// page, past the end clamps to the last.
    pub fn window(&self, count: usize, requested: i64) -> PageWindow {
        let num_pages = self.num_pages(count);
        let number = if requested < 1 {
            1
        } else {
            usize::try_from(requested).unwrap_or(usize::MAX).min(num_pages)
        };
        let offset = (number - 1) * self.per_page;
        let mut top = offset + self.per_page;
        if top + self.orphans >= count {
            top = count;
        }
        PageWindow {
            number,
            num_pages,
            offset,
            limit: top.saturating_sub(offset),
        }
    }
}

/// One materialised page of a feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub number: usize,
    pub num_pages: usize,
    pub total_count: usize,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, window: PageWindow, total_count: usize) -> Self {
        Self {
            items,
            number: window.number,
            num_pages: window.num_pages,
            total_count,
        }
    }

    pub fn has_next(&self) -> bool {
        self.number < self.num_pages
    }

    pub fn has_previous(&self) -> bool {
        self.number > 1
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}
