//! Book catalog client
//!
//! Searches the Google Books volumes API and fetches single volumes.
//! Failures never escape: a failed search is an empty result and a failed
//! lookup is `None`, the same as "nothing found".

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Result;
use serde::Deserialize;
use tracing::{debug, warn};

use bookshelf_core::{Book, Config};

/// Fetch timeout in seconds
const FETCH_TIMEOUT: u64 = 10;

/// Searches a featured selection is drawn from
pub const FEATURED_CATEGORIES: &[&str] = &[
    "bestsellers 2025",
    "classics",
    "science fiction",
    "fantasy",
];

/// Number of books in a featured selection
pub const FEATURED_COUNT: usize = 6;

/// Search response from the volumes endpoint
#[derive(Debug, Deserialize)]
struct VolumeList {
    #[serde(default)]
    items: Vec<Book>,
}

/// Client for the remote book catalog
pub struct CatalogClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    max_results: u32,
}

impl CatalogClient {
    /// Create a client from configuration
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(FETCH_TIMEOUT))
            .user_agent("Mozilla/5.0 (compatible; Bookshelf/1.0)")
            .build()?;

        Ok(Self {
            client,
            base_url: config.catalog_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            max_results: config.max_results,
        })
    }

    /// Search the catalog
    ///
    /// Returns an empty list for a blank query or on failure.
    pub async fn search(&self, query: &str) -> Vec<Book> {
        let query = query.trim();
        if query.is_empty() {
            debug!("Search query is empty, returning empty results");
            return Vec::new();
        }

        match self.search_inner(query).await {
            Ok(books) => books,
            Err(e) => {
                warn!("Error searching catalog for {:?}: {}", query, e);
                Vec::new()
            }
        }
    }

    /// Fetch a single book by catalog ID
    ///
    /// Returns `None` for an empty ID, an unknown ID, or on failure.
    pub async fn get_by_id(&self, id: &str) -> Option<Book> {
        let id = id.trim();
        if id.is_empty() {
            warn!("get_by_id called without an ID");
            return None;
        }

        match self.get_by_id_inner(id).await {
            Ok(book) => book,
            Err(e) => {
                warn!("Error fetching book {}: {}", id, e);
                None
            }
        }
    }

    /// A handful of books with covers from one category
    ///
    /// Picks one of [`FEATURED_CATEGORIES`] at random when `category` is
    /// `None`. Returns the category searched and the selection, which is
    /// empty if the search failed or nothing had a cover.
    pub async fn featured(&self, category: Option<&str>) -> (String, Vec<Book>) {
        let category = match category {
            Some(category) => category.to_string(),
            None => random_category().to_string(),
        };

        debug!("Fetching featured books for category: {}", category);
        let books = with_covers(self.search(&category).await, FEATURED_COUNT);
        (category, books)
    }

    async fn search_inner(&self, query: &str) -> Result<Vec<Book>> {
        let mut params = vec![
            ("q", query.to_string()),
            ("maxResults", self.max_results.to_string()),
        ];
        if let Some(ref key) = self.api_key {
            params.push(("key", key.clone()));
        }

        let response = self
            .client
            .get(&self.base_url)
            .query(&params)
            .send()
            .await?
            .error_for_status()?;

        let body = response.text().await?;
        parse_search(&body)
    }

    async fn get_by_id_inner(&self, id: &str) -> Result<Option<Book>> {
        let url = format!("{}/{}", self.base_url, id);
        let mut request = self.client.get(&url);
        if let Some(ref key) = self.api_key {
            request = request.query(&[("key", key)]);
        }

        let response = request.send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body = response.error_for_status()?.text().await?;
        parse_volume(&body)
    }
}

/// Parse a search response, keeping only records with an ID
fn parse_search(body: &str) -> Result<Vec<Book>> {
    let list: VolumeList = serde_json::from_str(body)?;
    Ok(list.items.into_iter().filter(Book::has_id).collect())
}

/// Keep the first `limit` books that have a cover image
fn with_covers(books: Vec<Book>, limit: usize) -> Vec<Book> {
    books
        .into_iter()
        .filter(|b| b.thumbnail().is_some())
        .take(limit)
        .collect()
}

fn random_category() -> &'static str {
    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.subsec_nanos() as usize);
    FEATURED_CATEGORIES[seed % FEATURED_CATEGORIES.len()]
}

/// Parse a single volume response
fn parse_volume(body: &str) -> Result<Option<Book>> {
    let book: Book = serde_json::from_str(body)?;
    Ok(book.has_id().then_some(book))
}
