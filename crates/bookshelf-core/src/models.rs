//! Data models for Bookshelf
//!
//! Defines the core data structures: Book, Rating and the rating map.
//! A book is an opaque catalog record: only its `id` carries meaning to
//! the library, the rest of the record is kept as it was received.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::library::LibraryError;

/// Serialized name of [`Book::id`]
const ID_FIELD: &str = "id";

/// A book record from the catalog
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Book {
    /// Catalog identifier, stable per catalog entry
    pub id: String,
    /// Everything else the catalog returned (title, authors, cover, ...)
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Book {
    /// Create a book with the given ID and an empty payload
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            payload: Map::new(),
        }
    }

    /// Create a book with the given ID and payload
    ///
    /// An `"id"` entry in the payload is dropped; the ID argument wins.
    pub fn with_payload(id: impl Into<String>, mut payload: Map<String, Value>) -> Self {
        payload.remove(ID_FIELD);
        Self {
            id: id.into(),
            payload,
        }
    }

    /// Set a top-level payload field
    ///
    /// `"id"` is reserved for [`Book::id`] and is ignored here.
    pub fn set_field(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        if key == ID_FIELD {
            return;
        }
        self.payload.insert(key, value.into());
    }

    /// Drop a payload `"id"` that would shadow the real ID when serialized
    ///
    /// Returns true if the payload held one.
    pub fn strip_shadow_id(&mut self) -> bool {
        self.payload.remove(ID_FIELD).is_some()
    }

    /// Builder form of [`Book::set_field`]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_field(key, value);
        self
    }

    /// Whether the ID is usable as a library key
    pub fn has_id(&self) -> bool {
        !self.id.trim().is_empty()
    }

    /// Title, if the record has one
    pub fn title(&self) -> Option<&str> {
        self.field("title").and_then(Value::as_str)
    }

    /// Subtitle, if the record has one
    pub fn subtitle(&self) -> Option<&str> {
        self.field("subtitle").and_then(Value::as_str)
    }

    /// Author names
    pub fn authors(&self) -> Vec<&str> {
        self.string_list("authors")
    }

    /// Categories
    pub fn categories(&self) -> Vec<&str> {
        self.string_list("categories")
    }

    /// Description
    pub fn description(&self) -> Option<&str> {
        self.field("description").and_then(Value::as_str)
    }

    /// Publisher
    pub fn publisher(&self) -> Option<&str> {
        self.field("publisher").and_then(Value::as_str)
    }

    /// Publication date as given by the catalog (free-form)
    pub fn published_date(&self) -> Option<&str> {
        self.field("publishedDate").and_then(Value::as_str)
    }

    /// Page count
    pub fn page_count(&self) -> Option<u64> {
        self.field("pageCount").and_then(Value::as_u64)
    }

    /// Cover image URL, preferring the larger thumbnail
    pub fn thumbnail(&self) -> Option<&str> {
        let links = self.field("imageLinks")?;
        links
            .get("thumbnail")
            .or_else(|| links.get("smallThumbnail"))
            .and_then(Value::as_str)
    }

    /// ISBN, preferring ISBN-13 over ISBN-10
    pub fn isbn(&self) -> Option<&str> {
        let identifiers = self.field("industryIdentifiers")?.as_array()?;
        let find = |kind: &str| {
            identifiers
                .iter()
                .find(|i| i.get("type").and_then(Value::as_str) == Some(kind))
                .and_then(|i| i.get("identifier"))
                .and_then(Value::as_str)
        };
        find("ISBN_13").or_else(|| find("ISBN_10"))
    }

    /// Look up a field in `volumeInfo` first, then at the top level
    fn field(&self, key: &str) -> Option<&Value> {
        self.payload
            .get("volumeInfo")
            .and_then(|info| info.get(key))
            .or_else(|| self.payload.get(key))
    }

    fn string_list(&self, key: &str) -> Vec<&str> {
        self.field(key)
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}

/// A star rating between 1 and 5 inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Rating(u8);

impl Rating {
    /// Lowest allowed rating
    pub const MIN: u8 = 1;
    /// Highest allowed rating
    pub const MAX: u8 = 5;

    /// Validate a rating
    pub fn new(value: i64) -> Result<Self, LibraryError> {
        if (i64::from(Self::MIN)..=i64::from(Self::MAX)).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(LibraryError::InvalidRating { value })
        }
    }

    /// The number of stars
    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for Rating {
    type Error = LibraryError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Rating::new(value)
    }
}

impl From<Rating> for u8 {
    fn from(rating: Rating) -> Self {
        rating.0
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ratings keyed by book ID
///
/// May hold ratings for books no longer in the collection.
pub type Ratings = BTreeMap<String, Rating>;
