use std::future::Future;

use crate::errors::CrmError;

/// One listing response: its items plus the cursor for the next page, if any.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, next_cursor: Option<String>) -> Self {
        let next_cursor = next_cursor.filter(|cursor| !cursor.is_empty());
        Self { items, next_cursor }
    }
}

/// Follows cursors until a page comes back without one, concatenating items in
/// the order the pages arrived. Any failed page aborts the whole listing.
///
/// `max_pages` bounds the loop; a cursor that repeats the one just sent is
/// treated as a stuck upstream.
pub async fn collect_pages<T, F, Fut>(max_pages: usize, mut fetch: F) -> Result<Vec<T>, CrmError>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>, CrmError>>,
{
    let mut items = Vec::new();
    let mut cursor: Option<String> = None;
    let mut pages = 0usize;

    loop {
        if pages >= max_pages {
            return Err(CrmError::PageLimitExceeded { max_pages });
        }

        let page = fetch(cursor.clone()).await?;
        pages += 1;
        items.extend(page.items);

        match page.next_cursor {
            Some(next) if cursor.as_deref() == Some(next.as_str()) => {
                return Err(CrmError::RepeatedCursor(next));
            }
            Some(next) => cursor = Some(next),
            None => return Ok(items),
        }
    }
}
