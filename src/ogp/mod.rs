//! Open Graph preview pipeline: extract metadata from HTML, fetch pages with
//! a bounded timeout, and coalesce/cache fetches per URL.

pub mod cache;
pub mod extractor;
pub mod fetch;

pub use cache::{Clock, OgpRequestCache, SystemClock, CACHE_TTL};
pub use extractor::extract;
pub use fetch::{
    FailureKind, FetchConfig, FetchError, FetchOutcome, OgpFetchService, OgpFetcher,
    FETCH_TIMEOUT,
};
