//! Page arithmetic shared by the paginated reads

use crate::error::{Result, StreamforgeError};

/// Number of pages needed for `total` items
pub fn total_pages(total: usize, page_size: usize) -> usize {
    if page_size == 0 {
        return 0;
    }
    total / page_size + usize::from(total % page_size != 0)
}

/// Validate a 1-based page number against a page count
///
/// An empty collection still has one valid (empty) page.
///
/// # Errors
///
/// Returns [`StreamforgeError::InvalidPage`] when `page < 1` or
/// `page > max(1, total_pages)`.
///
/// # Examples
///
/// ```
/// use streamforge::pagination::validate_page;
///
/// assert_eq!(validate_page(2, 5).unwrap(), 2);
/// assert_eq!(validate_page(1, 0).unwrap(), 1);
/// assert!(validate_page(0, 5).is_err());
/// assert!(validate_page(6, 5).is_err());
/// ```
pub fn validate_page(page: i64, total_pages: usize) -> Result<usize> {
    let max = total_pages.max(1);
    match usize::try_from(page) {
        Ok(p) if p >= 1 && p <= max => Ok(p),
        _ => Err(StreamforgeError::InvalidPage { page, max }.into()),
    }
}
