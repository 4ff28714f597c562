//! Draining page cursors.

use crate::client::PageCursor;
use crate::context::OperationGuard;
use crate::{RecoveryError, Result};
use futures::stream::{self, Stream, TryStreamExt};
use std::collections::HashMap;

/// Turns a cursor into a stream of pages.
///
/// A page is yielded only once the advance past it succeeded, so a failing
/// advance ends the stream with that error instead of a page.
pub(crate) fn pages<T>(
    cursor: Box<dyn PageCursor<T>>,
    guard: OperationGuard,
) -> impl Stream<Item = Result<Vec<T>>> + Send
where
    T: Clone + Send + 'static,
{
    stream::try_unfold((cursor, guard), |(mut cursor, guard)| async move {
        if !cursor.has_more() {
            return Ok::<_, RecoveryError>(None);
        }
        let page = cursor.current().to_vec();
        guard.run(cursor.advance()).await?;
        Ok::<_, RecoveryError>(Some((page, (cursor, guard))))
    })
}

/// Drains `cursor` into a map.
///
/// `entry` turns each record into a key and value, or `None` to skip it.
/// Later entries overwrite earlier ones with the same key. On any error the
/// partial map is dropped.
pub(crate) async fn drain_into_map<T, V, F>(
    cursor: Box<dyn PageCursor<T>>,
    guard: OperationGuard,
    mut entry: F,
) -> Result<HashMap<String, V>>
where
    T: Clone + Send + 'static,
    F: FnMut(T) -> Option<(String, V)>,
{
    let mut out = HashMap::new();
    let mut pages = Box::pin(pages(cursor, guard));

    while let Some(page) = pages.try_next().await? {
        for record in page {
            if let Some((key, value)) = entry(record) {
                out.insert(key, value);
            }
        }
    }

    Ok(out)
}
