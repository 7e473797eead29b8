use serde::{Deserialize, Serialize};

use crate::constants::MAX_PAGE_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub offset: i64,
    pub limit: i64,
}

impl PageRequest {
    /// Clamps client supplied values into a usable window.
    pub fn new(offset: Option<i64>, limit: Option<i64>, default_limit: i64) -> Self {
        Self {
            offset: offset.unwrap_or(0).max(0),
            limit: limit.unwrap_or(default_limit).clamp(1, MAX_PAGE_SIZE),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PageContext<T> {
    pub rows: Vec<T>,
    pub total_rows: i64,
    pub next_offset: Option<i64>,
    pub prev_offset: Option<i64>,
}

impl<T> PageContext<T> {
    pub fn from_rows(rows: Vec<T>, total_rows: i64, page: PageRequest) -> Self {
        if rows.is_empty() && page.offset == 0 {
            return Self::no_rows();
        }

        let next_offset = Some(page.offset + page.limit).filter(|next| *next < total_rows);
        let prev_offset = Some((page.offset - page.limit).max(0)).filter(|_| page.offset > 0);

        Self {
            rows,
            total_rows,
            next_offset,
            prev_offset,
        }
    }

    pub fn no_rows() -> Self {
        Self {
            rows: vec![],
            total_rows: 0,
            next_offset: None,
            prev_offset: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_are_clamped() {
        assert_eq!(
            PageRequest::new(Some(-3), Some(0), 6),
            PageRequest { offset: 0, limit: 1 }
        );
        assert_eq!(
            PageRequest::new(None, Some(10_000), 6),
            PageRequest { offset: 0, limit: MAX_PAGE_SIZE }
        );
        assert_eq!(PageRequest::new(None, None, 6), PageRequest { offset: 0, limit: 6 });
    }

    #[test]
    fn middle_page_links_both_ways() {
        let page = PageContext::from_rows(vec![7, 8, 9], 10, PageRequest { offset: 3, limit: 3 });

        assert_eq!(page.next_offset, Some(6));
        assert_eq!(page.prev_offset, Some(0));
    }

    #[test]
    fn last_page_has_no_next() {
        let page = PageContext::from_rows(vec![10], 10, PageRequest { offset: 9, limit: 3 });

        assert_eq!(page.next_offset, None);
        assert_eq!(page.prev_offset, Some(6));
    }

    #[test]
    fn empty_first_page_is_no_rows() {
        let page: PageContext<i32> = PageContext::from_rows(vec![], 0, PageRequest::new(None, None, 6));
        assert_eq!(page, PageContext::no_rows());
    }

    #[test]
    fn page_past_the_end_keeps_the_real_total() {
        let page: PageContext<i32> = PageContext::from_rows(vec![], 4, PageRequest { offset: 12, limit: 6 });

        assert_eq!(page.total_rows, 4);
        assert_eq!(page.next_offset, None);
        assert_eq!(page.prev_offset, Some(6));
    }
}
