//! Page windowing with clamping. Out-of-range page numbers never error,
//! they snap to the nearest valid page.

/// Discord select menus cap out at 25 options.
pub const ROLE_SELECT_PAGE_SIZE: usize = 25;
/// Settings listings stay short enough to fit one embed comfortably.
pub const SETTINGS_LIST_PAGE_SIZE: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<'a, T> {
    pub items: &'a [T],
    /// 1-based page number after clamping.
    pub current_page: usize,
    /// Always at least 1, even for an empty collection.
    pub total_pages: usize,
    pub total_items: usize,
}

impl<'a, T> Page<'a, T> {
    pub fn has_previous(&self) -> bool {
        self.current_page > 1
    }

    pub fn has_next(&self) -> bool {
        self.current_page < self.total_pages
    }
}

/// Slices `items` into the requested page. `requested_page` is 1-based and
/// may be any integer; values below 1 clamp to the first page and values
/// past the end clamp to the last page.
pub fn paginate<T>(items: &[T], page_size: usize, requested_page: i64) -> Page<'_, T> {
    let page_size = page_size.max(1);
    let total_items = items.len();
    let total_pages = total_items.div_ceil(page_size).max(1);

    let current_page = if requested_page < 1 {
        1
    } else {
        (requested_page as usize).min(total_pages)
    };

    let start = (current_page - 1) * page_size;
    let end = (start + page_size).min(total_items);
    let items = if start >= total_items {
        &items[0..0]
    } else {
        &items[start..end]
    };

    Page {
        items,
        current_page,
        total_pages,
        total_items,
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::paginate;

    fn numbers(n: usize) -> Vec<usize> {
        (0..n).collect()
    }

    #[test_case(0, 1 ; "below range clamps to first")]
    #[test_case(-5, 1 ; "negative clamps to first")]
    #[test_case(1, 1 ; "first page stays")]
    #[test_case(3, 3 ; "last page stays")]
    #[test_case(4, 3 ; "past the end clamps to last")]
    #[test_case(99, 3 ; "far past the end clamps to last")]
    fn requested_page_is_clamped(requested: i64, expected: usize) {
        let items = numbers(55);
        let page = paginate(&items, 25, requested);
        assert_eq!(page.current_page, expected);
        assert_eq!(page.total_pages, 3);
    }

    #[test]
    fn empty_collection_still_has_one_page() {
        let items: Vec<usize> = Vec::new();
        let page = paginate(&items, 25, 1);
        assert_eq!(page.total_pages, 1);
        assert_eq!(page.current_page, 1);
        assert!(page.items.is_empty());
        assert!(!page.has_previous());
        assert!(!page.has_next());
    }

    #[test]
    fn pages_cover_all_items_without_overlap() {
        let items = numbers(55);
        let first = paginate(&items, 25, 1);
        let second = paginate(&items, 25, 2);
        let third = paginate(&items, 25, 3);

        assert_eq!(first.items.len(), 25);
        assert_eq!(second.items.len(), 25);
        assert_eq!(third.items.len(), 5);
        assert_eq!(first.items.last(), Some(&24));
        assert_eq!(second.items.first(), Some(&25));
        assert_eq!(third.items.first(), Some(&50));
        assert!(first.has_next());
        assert!(!first.has_previous());
        assert!(third.has_previous());
        assert!(!third.has_next());
    }

    #[test]
    fn exact_multiple_has_no_phantom_page() {
        let items = numbers(50);
        let page = paginate(&items, 25, 1);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.total_items, 50);
    }
}
