//! Persisted string format
//!
//! The collection is stored as a JSON array of book records and the rating
//! map as a JSON object from book ID to star count. Decoding validates the
//! library invariants so a damaged value is rejected as a whole instead of
//! leaking into memory.

use std::collections::HashSet;

use serde_json::Value;
use thiserror::Error;

use crate::models::{Book, Rating, Ratings};

/// A stored value could not be decoded
#[derive(Error, Debug)]
pub enum DecodeError {
    /// Not valid JSON
    #[error("Malformed JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Valid JSON of the wrong shape
    #[error("Unexpected shape: {0}")]
    UnexpectedShape(String),

    /// A book record without a usable ID
    #[error("Book at index {index} has no ID")]
    MissingId { index: usize },

    /// Two book records share an ID
    #[error("Duplicate book ID '{0}'")]
    DuplicateId(String),

    /// A rating outside 1..=5
    #[error("Rating for '{id}' out of range: {value}")]
    RatingOutOfRange { id: String, value: Value },
}

/// Encode the collection
///
/// Each record is the book's payload with its ID set on top, so a stray
/// `"id"` in the payload can never produce a second `"id"` key.
pub fn encode_collection(books: &[Book]) -> String {
    let records: Vec<Value> = books.iter().map(record).collect();
    Value::Array(records).to_string()
}

fn record(book: &Book) -> Value {
    let mut fields = book.payload.clone();
    fields.insert("id".to_string(), Value::String(book.id.clone()));
    Value::Object(fields)
}

/// Decode the collection
pub fn decode_collection(input: &str) -> Result<Vec<Book>, DecodeError> {
    let value: Value = serde_json::from_str(input)?;
    let Value::Array(items) = value else {
        return Err(DecodeError::UnexpectedShape(format!(
            "expected an array of books, found {}",
            kind(&value)
        )));
    };

    let mut seen = HashSet::with_capacity(items.len());
    let mut books = Vec::with_capacity(items.len());

    for (index, item) in items.into_iter().enumerate() {
        if !item.is_object() {
            return Err(DecodeError::UnexpectedShape(format!(
                "book at index {} is {}",
                index,
                kind(&item)
            )));
        }
        if !item.get("id").is_some_and(Value::is_string) {
            return Err(DecodeError::MissingId { index });
        }

        let book: Book = serde_json::from_value(item)?;
        if !book.has_id() {
            return Err(DecodeError::MissingId { index });
        }
        if !seen.insert(book.id.clone()) {
            return Err(DecodeError::DuplicateId(book.id));
        }
        books.push(book);
    }

    Ok(books)
}

/// Encode the rating map
pub fn encode_ratings(ratings: &Ratings) -> String {
    serde_json::to_string(ratings).unwrap_or_else(|_| "{}".to_string())
}

/// Decode the rating map
pub fn decode_ratings(input: &str) -> Result<Ratings, DecodeError> {
    let value: Value = serde_json::from_str(input)?;
    let Value::Object(entries) = value else {
        return Err(DecodeError::UnexpectedShape(format!(
            "expected an object of ratings, found {}",
            kind(&value)
        )));
    };

    let mut ratings = Ratings::new();
    for (id, raw) in entries {
        let rating = raw.as_i64().and_then(|n| Rating::new(n).ok());
        match rating {
            Some(rating) => {
                ratings.insert(id, rating);
            }
            None => return Err(DecodeError::RatingOutOfRange { id, value: raw }),
        }
    }

    Ok(ratings)
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
