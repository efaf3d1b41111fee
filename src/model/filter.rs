use serde::{Deserialize, Serialize};

use crate::model::Id;

pub const DEFAULT_PAGE_LIMIT: usize = 100;
pub const MAX_PAGE_LIMIT: usize = 1000;
/// Largest offset honoured; fits a signed 64-bit SQL bind on every platform.
pub const MAX_PAGE_OFFSET: usize = i32::MAX as usize;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SectorFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region_id: Option<Id>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<Id>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClusterFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region_id: Option<Id>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
}

/// Clamp a requested page window to `(limit, offset)`.
pub fn page_window(limit: Option<usize>, offset: Option<usize>) -> (usize, usize) {
    let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT);
    (limit, offset.unwrap_or(0).min(MAX_PAGE_OFFSET))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

impl<T> Page<T> {
    /// Slice an already filtered, ordered list.
    pub fn from_all(all: Vec<T>, limit: Option<usize>, offset: Option<usize>) -> Self {
        let (limit, offset) = page_window(limit, offset);
        let total = all.len();
        let items = all.into_iter().skip(offset).take(limit).collect();
        Self {
            items,
            total,
            limit,
            offset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_from_all() {
        let page = Page::from_all((0..10).collect::<Vec<_>>(), Some(3), Some(8));
        assert_eq!(page.items, vec![8, 9]);
        assert_eq!(page.total, 10);
        assert_eq!(page_window(Some(0), None), (1, 0));
        assert_eq!(page_window(None, None), (DEFAULT_PAGE_LIMIT, 0));
    }

    #[test]
    fn test_huge_offset_is_clamped() {
        let (_, offset) = page_window(None, Some(usize::MAX));
        assert_eq!(offset, MAX_PAGE_OFFSET);
        assert!(i64::try_from(offset).is_ok());

        let page = Page::from_all(vec![1, 2, 3], None, Some(usize::MAX));
        assert!(page.items.is_empty());
        assert_eq!(page.total, 3);
    }
}
