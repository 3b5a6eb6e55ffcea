use serde::{Deserialize, Serialize};

/// Offset/limit pagination for list queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

impl Page {
    /// Maximum page size accepted from callers.
    pub const MAX_LIMIT: usize = 100;

    /// Creates a page, clamping the limit to [`Page::MAX_LIMIT`].
    pub fn new(offset: usize, limit: usize) -> Self {
        Self {
            offset,
            limit: limit.min(Self::MAX_LIMIT),
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 20,
        }
    }
}
