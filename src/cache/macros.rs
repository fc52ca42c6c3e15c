/// Look a value up in the cache, computing and storing it on a miss.
///
/// Reads never fail the surrounding lookup: a cache error is a miss. The
/// computed value is written by the background writer, so the caller never
/// waits on Redis for the store.
///
/// # Arguments
/// * `$cache`: a [`Cache`](crate::cache::Cache).
/// * `$key`: the [`CacheKey`](crate::cache::CacheKey) to read and write.
/// * `$ttl`: time-to-live of the stored value in seconds.
/// * `$block`: future producing `AppResult<T>` when the key is missing.
///
/// # Example
/// ```rust,ignore
/// let movies: Vec<TmdbMovie> = cached!(self.cache, CacheKey::MovieSearch(q), 3600, async move {
///     fetch_movies(q).await
/// })?;
/// ```
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $ttl:expr, $block:expr) => {{
        let key = $key;
        if let Some(cached) = $cache.get_from_cache(&key).await {
            Ok(cached)
        } else {
            let value = $block.await?;
            $cache.set_in_background(&key, &value, $ttl);
            Ok(value)
        }
    }};
}
