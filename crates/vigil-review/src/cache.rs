use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use tokio::sync::Mutex;
use vigil_core::VigilError;

use crate::github::is_sentinel;

/// Run-scoped memo of file contents keyed by path.
///
/// One lock guards the whole map and is held across the upstream fetch, so
/// concurrent requests for an uncached path wait for the first fetch instead
/// of issuing their own. Waiting is bounded by the lock timeout.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use vigil_review::cache::ContentCache;
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let cache = ContentCache::new(Duration::from_secs(5));
/// let a = cache.get("src/a.rs", || async { Ok("fn a() {}".to_string()) }).await.unwrap();
/// let b = cache.get("src/a.rs", || async { Ok("never fetched".to_string()) }).await.unwrap();
/// assert_eq!(a, b);
/// # });
/// ```
#[derive(Debug)]
pub struct ContentCache {
    entries: Mutex<HashMap<String, String>>,
    lock_timeout: Duration,
}

impl ContentCache {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            lock_timeout,
        }
    }

    /// Return the content of `path`, calling `fetch` only on a miss.
    ///
    /// Degraded-content sentinels are returned but not memoised.
    ///
    /// # Errors
    ///
    /// Returns [`VigilError::CacheTimeout`] if the lock cannot be acquired
    /// within the timeout, or whatever `fetch` returns.
    pub async fn get<F, Fut>(&self, path: &str, fetch: F) -> Result<String, VigilError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, VigilError>>,
    {
        let mut entries = tokio::time::timeout(self.lock_timeout, self.entries.lock())
            .await
            .map_err(|_| {
                VigilError::CacheTimeout(format!(
                    "waited {}ms for content of {path}",
                    self.lock_timeout.as_millis()
                ))
            })?;

        if let Some(content) = entries.get(path) {
            return Ok(content.clone());
        }

        let content = fetch().await?;
        if !is_sentinel(&content) {
            entries.insert(path.to_string(), content.clone());
        }
        Ok(content)
    }

    /// Return lines `start..=end` of `path` widened by `margin` on each side.
    ///
    /// The slice is cut from the full cached content, so different ranges of
    /// the same file share one fetch. Missing bounds mean the start or end of
    /// the file.
    ///
    /// # Errors
    ///
    /// Same as [`ContentCache::get`].
    pub async fn get_range<F, Fut>(
        &self,
        path: &str,
        start: Option<u32>,
        end: Option<u32>,
        margin: u32,
        fetch: F,
    ) -> Result<String, VigilError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, VigilError>>,
    {
        let content = self.get(path, fetch).await?;
        if is_sentinel(&content) || (start.is_none() && end.is_none()) {
            return Ok(content);
        }
        let start = start.unwrap_or(1).saturating_sub(margin).max(1);
        let end = end.map(|e| e.saturating_add(margin));
        Ok(slice_lines(&content, start, end))
    }

    #[cfg(test)]
    async fn contains(&self, path: &str) -> bool {
        self.entries.lock().await.contains_key(path)
    }
}

/// Lines `start..=end` (1-based, inclusive) of `content`, clamped to the file.
///
/// # Examples
///
/// ```
/// use vigil_review::cache::slice_lines;
///
/// let text = "a\nb\nc\nd";
/// assert_eq!(slice_lines(text, 2, Some(3)), "b\nc");
/// assert_eq!(slice_lines(text, 3, None), "c\nd");
/// assert_eq!(slice_lines(text, 9, Some(12)), "");
/// ```
pub fn slice_lines(content: &str, start: u32, end: Option<u32>) -> String {
    let skip = start.max(1) as usize - 1;
    let take = match end {
        Some(end) if end >= start => (end - start.max(1)) as usize + 1,
        Some(_) => 0,
        None => usize::MAX,
    };
    content
        .lines()
        .skip(skip)
        .take(take)
        .collect::<Vec<_>>()
        .join("\n")
}
