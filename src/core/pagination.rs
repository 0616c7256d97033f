//! Page windows over filtered collections

use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use crate::core::query::{PAGE_PARAM, PAGE_SIZE_PARAM};
use crate::core::sync::QueryPort;

/// Page size used when a resource does not configure one
pub const DEFAULT_PAGE_SIZE: usize = 15;

/// Pagination metadata
///
/// `page` is always clamped into `[1, total_pages]` and `total_pages` is at
/// least 1, even for an empty collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationMeta {
    /// Current page number (starts at 1)
    pub page: usize,

    /// Number of items per page
    pub page_size: usize,

    /// Total number of items (after filters)
    pub total_items: usize,

    /// Total number of pages
    pub total_pages: usize,

    /// Whether there is a next page
    pub has_next: bool,

    /// Whether there is a previous page
    pub has_prev: bool,

    /// Index of the first item of the page in the collection
    pub start_index: usize,

    /// Index one past the last item of the page
    pub end_index: usize,
}

impl PaginationMeta {
    /// Compute metadata for a requested page
    pub fn new(page: usize, page_size: usize, total_items: usize) -> Self {
        // Ensure page_size is at least 1 to avoid division by zero
        let page_size = page_size.max(1);
        let total_pages = total_items.div_ceil(page_size).max(1);
        let page = page.clamp(1, total_pages);
        let start_index = (page - 1) * page_size;
        let end_index = (start_index + page_size).min(total_items);

        Self {
            page,
            page_size,
            total_items,
            total_pages,
            has_next: page < total_pages,
            has_prev: page > 1,
            start_index,
            end_index,
        }
    }
}

/// One window of a collection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    /// Items of the page
    pub items: Vec<T>,

    /// Pagination metadata
    pub pagination: PaginationMeta,
}

impl<T> Page<T> {
    pub fn page(&self) -> usize {
        self.pagination.page
    }

    pub fn total_pages(&self) -> usize {
        self.pagination.total_pages
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Slice `items` into the page `page` of size `page_size`
///
/// Out-of-range pages are clamped.
pub fn paginate<T: Clone>(items: &[T], page_size: usize, page: usize) -> Page<T> {
    let pagination = PaginationMeta::new(page, page_size, items.len());
    Page {
        items: items[pagination.start_index..pagination.end_index].to_vec(),
        pagination,
    }
}

/// Parse a positive integer the way `parseInt` does, ignoring trailing junk
///
/// Returns `None` for anything below 1 or without leading digits.
pub fn parse_positive(raw: &str) -> Option<usize> {
    let trimmed = raw.trim_start();
    let trimmed = trimmed.strip_prefix('+').unwrap_or(trimmed);
    let digits: String = trimmed.chars().take_while(char::is_ascii_digit).collect();
    digits.parse::<usize>().ok().filter(|n| *n >= 1)
}

enum PaginationMode {
    UrlSynced { port: Arc<dyn QueryPort> },
    InMemory { page: usize, page_size: usize },
}

/// Current page and page size of a table
///
/// URL-synced pagination reads `page` / `pageSize` from the query port on
/// every access; in-memory pagination keeps them locally.
pub struct Pagination {
    default_page_size: usize,
    mode: PaginationMode,
}

impl fmt::Debug for Pagination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pagination")
            .field("default_page_size", &self.default_page_size)
            .field("url_synced", &self.is_url_synced())
            .field("page", &self.requested_page())
            .field("page_size", &self.page_size())
            .finish()
    }
}

impl Pagination {
    pub fn in_memory(default_page_size: usize) -> Self {
        let default_page_size = default_page_size.max(1);
        Self {
            default_page_size,
            mode: PaginationMode::InMemory {
                page: 1,
                page_size: default_page_size,
            },
        }
    }

    pub fn url_synced(port: Arc<dyn QueryPort>, default_page_size: usize) -> Self {
        Self {
            default_page_size: default_page_size.max(1),
            mode: PaginationMode::UrlSynced { port },
        }
    }

    pub fn is_url_synced(&self) -> bool {
        matches!(self.mode, PaginationMode::UrlSynced { .. })
    }

    pub fn default_page_size(&self) -> usize {
        self.default_page_size
    }

    /// Requested page, before clamping against the collection size
    pub fn requested_page(&self) -> usize {
        match &self.mode {
            PaginationMode::UrlSynced { port } => port
                .read()
                .get(PAGE_PARAM)
                .and_then(parse_positive)
                .unwrap_or(1),
            PaginationMode::InMemory { page, .. } => *page,
        }
    }

    pub fn page_size(&self) -> usize {
        match &self.mode {
            PaginationMode::UrlSynced { port } => port
                .read()
                .get(PAGE_SIZE_PARAM)
                .and_then(parse_positive)
                .unwrap_or(self.default_page_size),
            PaginationMode::InMemory { page_size, .. } => *page_size,
        }
    }

    /// Metadata for a collection of `total_items`
    pub fn meta(&self, total_items: usize) -> PaginationMeta {
        PaginationMeta::new(self.requested_page(), self.page_size(), total_items)
    }

    /// Current page of `items`
    pub fn paginate<T: Clone>(&self, items: &[T]) -> Page<T> {
        paginate(items, self.page_size(), self.requested_page())
    }

    /// Go to `page`, clamped against a collection of `total_items`
    pub fn go_to_page(&mut self, page: usize, total_items: usize) {
        let page_size = self.page_size();
        let page = PaginationMeta::new(page, page_size, total_items).page;
        if let PaginationMode::InMemory { page: current, .. } = &mut self.mode {
            *current = page;
        } else {
            self.write(page, page_size);
        }
    }

    /// Change the page size and go back to page 1
    ///
    /// Sizes below 1 fall back to the default page size.
    pub fn set_page_size(&mut self, size: usize) {
        let size = if size >= 1 { size } else { self.default_page_size };
        if let PaginationMode::InMemory { page, page_size } = &mut self.mode {
            *page = 1;
            *page_size = size;
        } else {
            self.write(1, size);
        }
    }

    /// Back to page 1 without touching the page size
    pub fn reset(&mut self) {
        let page_size = self.page_size();
        if let PaginationMode::InMemory { page, .. } = &mut self.mode {
            *page = 1;
        } else {
            self.write(1, page_size);
        }
    }

    fn write(&self, page: usize, page_size: usize) {
        let PaginationMode::UrlSynced { port } = &self.mode else {
            return;
        };
        let current = port.read();
        let mut params = current.clone();
        if page <= 1 {
            params.delete(PAGE_PARAM);
        } else {
            params.set(PAGE_PARAM, page.to_string());
        }
        if page_size == self.default_page_size {
            params.delete(PAGE_SIZE_PARAM);
        } else {
            params.set(PAGE_SIZE_PARAM, page_size.to_string());
        }
        if params != current {
            tracing::debug!(page, page_size, "writing pagination to query");
            port.replace(params);
        }
    }
}
