//! Library state manager
//!
//! The `Library` owns the user's saved books and ratings. It is the only
//! place either is mutated, and it keeps storage in step with memory:
//!
//! - On open, both structures are rehydrated from the store. A value that
//!   fails to decode is dropped from the store and replaced by an empty one.
//!   A value that cannot be read at all is left alone, and the session
//!   refuses to overwrite it until it is gone.
//! - After every mutation the whole structure is encoded and written back
//!   under its key.
//! - Memory is authoritative. A failed write is logged and reported on the
//!   returned [`Receipt`], but the mutation stands; the next successful
//!   write of that structure brings storage back in line.
//!
//! ## Usage
//!
//! ```ignore
//! let mut library = Library::open(FileStore::new(config.store_dir()));
//!
//! let subscription = library.subscribe(|event, snapshot| {
//!     println!("{:?}: {} book(s)", event, snapshot.books().len());
//! });
//!
//! library.add_to_library(book)?;
//! library.rate_book(&id, 5)?;
//! library.unsubscribe(subscription);
//! ```

use std::collections::HashSet;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::codec::{self, DecodeError};
use crate::events::{LibraryEvent, Listeners, Snapshot, Subscription};
use crate::models::{Book, Rating, Ratings};
use crate::storage::{KeyValueStore, StorageError};

/// Store key for the collection
pub const COLLECTION_KEY: &str = "library.collection.v1";

/// Store key for the rating map
pub const RATINGS_KEY: &str = "library.ratings.v1";

/// Rejected library operations
///
/// None of these change library state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LibraryError {
    /// The book is already in the library
    #[error("Book '{id}' is already in your library")]
    DuplicateEntry { id: String },

    /// Rating outside 1..=5
    #[error("Invalid rating {value}: ratings go from 1 to 5")]
    InvalidRating { value: i64 },

    /// The book ID is empty
    #[error("Book ID must not be empty")]
    MissingId,
}

/// A committed change to the library
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Added { id: String },
    Removed { id: String },
    Rated { id: String, rating: Rating },
    OrphanRatingsPruned { count: usize },
}

impl From<&Change> for LibraryEvent {
    fn from(change: &Change) -> Self {
        match change {
            Change::Added { id } => LibraryEvent::BookAdded { id: id.clone() },
            Change::Removed { id } => LibraryEvent::BookRemoved { id: id.clone() },
            Change::Rated { id, rating } => LibraryEvent::BookRated {
                id: id.clone(),
                rating: *rating,
            },
            Change::OrphanRatingsPruned { count } => {
                LibraryEvent::OrphanRatingsPruned { count: *count }
            }
        }
    }
}

/// Outcome of a library operation that did not fail
#[derive(Debug)]
pub struct Receipt {
    /// What changed, `None` when the operation had nothing to do
    pub change: Option<Change>,
    /// Set when the change could not be written to storage
    pub write_error: Option<StorageError>,
}

impl Receipt {
    fn noop() -> Self {
        Self {
            change: None,
            write_error: None,
        }
    }

    /// Whether the operation left the library as it was
    pub fn is_noop(&self) -> bool {
        self.change.is_none()
    }

    /// Whether the change (if any) reached storage
    pub fn is_durable(&self) -> bool {
        self.write_error.is_none()
    }

    /// Soft warning to show the user when the change is not durable
    pub fn warning(&self) -> Option<String> {
        let error = self.write_error.as_ref()?;
        let mut message = format!("Change kept for this session but not saved: {}", error);
        if let Some(suggestion) = error.recovery_suggestion() {
            message.push(' ');
            message.push_str(suggestion);
        }
        Some(message)
    }
}

/// The user's book collection and ratings
///
/// Created once per session with [`Library::open`] and passed to whatever
/// needs it; there is no global instance.
#[derive(Debug)]
pub struct Library<S> {
    books: Vec<Book>,
    ratings: Ratings,
    store: S,
    listeners: Listeners,
    discarded: Vec<&'static str>,
    unreadable: Vec<&'static str>,
}

impl<S: KeyValueStore> Library<S> {
    /// Open the library, rehydrating from `store`
    ///
    /// Never fails: missing values start empty, corrupt values are removed
    /// from the store and start empty, unreadable values start empty and
    /// stay protected from writes (see [`Library::unreadable_keys`]).
    pub fn open(mut store: S) -> Self {
        let mut discarded = Vec::new();
        let mut unreadable = Vec::new();

        let books = match rehydrate(&mut store, COLLECTION_KEY, codec::decode_collection) {
            Rehydrated::Loaded(books) => books,
            Rehydrated::Discarded => {
                discarded.push(COLLECTION_KEY);
                Vec::new()
            }
            Rehydrated::Unreadable => {
                unreadable.push(COLLECTION_KEY);
                Vec::new()
            }
        };
        let ratings = match rehydrate(&mut store, RATINGS_KEY, codec::decode_ratings) {
            Rehydrated::Loaded(ratings) => ratings,
            Rehydrated::Discarded => {
                discarded.push(RATINGS_KEY);
                Ratings::new()
            }
            Rehydrated::Unreadable => {
                unreadable.push(RATINGS_KEY);
                Ratings::new()
            }
        };

        info!(
            "Library opened with {} book(s) and {} rating(s)",
            books.len(),
            ratings.len()
        );

        Self {
            books,
            ratings,
            store,
            listeners: Listeners::default(),
            discarded,
            unreadable,
        }
    }

    /// End the session, handing back the store
    pub fn into_store(self) -> S {
        self.store
    }

    /// The backing store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Mutable access to the backing store
    ///
    /// Values written through this handle are not seen by the library
    /// until it is reopened, and are overwritten by the next mutation.
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Keys dropped as corrupt while opening this library
    pub fn discarded_keys(&self) -> &[&'static str] {
        &self.discarded
    }

    /// Keys whose stored value could not be read while opening
    ///
    /// The stored value may still be intact, so writes to these keys are
    /// refused with [`StorageError::Unreadable`] for the rest of the
    /// session, unless the value has since disappeared from the store.
    pub fn unreadable_keys(&self) -> &[&'static str] {
        &self.unreadable
    }

    // ==================== Collection ====================

    /// Add a book to the end of the collection
    ///
    /// A book whose ID is already saved is not added again: the saved
    /// record is kept, subscribers get [`LibraryEvent::DuplicateIgnored`]
    /// and the caller gets [`LibraryError::DuplicateEntry`].
    pub fn add_to_library(&mut self, mut book: Book) -> Result<Receipt, LibraryError> {
        if !book.has_id() {
            return Err(LibraryError::MissingId);
        }

        if self.is_in_library(&book.id) {
            debug!("Book {} already in library", book.id);
            let id = book.id;
            self.notify(&LibraryEvent::DuplicateIgnored { id: id.clone() });
            return Err(LibraryError::DuplicateEntry { id });
        }

        if book.strip_shadow_id() {
            debug!("Dropped payload \"id\" field from book {}", book.id);
        }

        let id = book.id.clone();
        self.books.push(book);
        Ok(self.commit_collection(Change::Added { id }))
    }

    /// Remove a book from the collection
    ///
    /// Removing a book that is not saved does nothing. Ratings are kept.
    pub fn remove_from_library(&mut self, id: &str) -> Receipt {
        let Some(position) = self.books.iter().position(|b| b.id == id) else {
            debug!("Book {} not in library, nothing to remove", id);
            return Receipt::noop();
        };

        let removed = self.books.remove(position);
        self.commit_collection(Change::Removed { id: removed.id })
    }

    /// Whether a book is in the collection
    pub fn is_in_library(&self, id: &str) -> bool {
        self.books.iter().any(|b| b.id == id)
    }

    /// Get a saved book
    pub fn get_book(&self, id: &str) -> Option<&Book> {
        self.books.iter().find(|b| b.id == id)
    }

    /// All saved books in the order they were added
    pub fn books(&self) -> &[Book] {
        &self.books
    }

    /// Number of saved books
    pub fn len(&self) -> usize {
        self.books.len()
    }

    /// Whether no books are saved
    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }

    // ==================== Ratings ====================

    /// Rate a book from 1 to 5 stars
    ///
    /// The book does not have to be in the collection. An out-of-range
    /// rating is rejected and nothing is written.
    pub fn rate_book(&mut self, id: &str, rating: i64) -> Result<Receipt, LibraryError> {
        if id.trim().is_empty() {
            return Err(LibraryError::MissingId);
        }
        let rating = Rating::new(rating)?;

        self.ratings.insert(id.to_string(), rating);
        Ok(self.commit_ratings(Change::Rated {
            id: id.to_string(),
            rating,
        }))
    }

    /// Rating for a book, 0 when unrated
    pub fn get_rating(&self, id: &str) -> u8 {
        self.ratings.get(id).map_or(0, |r| r.value())
    }

    /// All ratings, including ratings for books no longer saved
    pub fn ratings(&self) -> &Ratings {
        &self.ratings
    }

    /// Saved books that have a rating, in collection order
    pub fn rated_books(&self) -> Vec<(&Book, Rating)> {
        self.books
            .iter()
            .filter_map(|b| self.ratings.get(&b.id).map(|r| (b, *r)))
            .collect()
    }

    /// Drop ratings for books that are no longer in the collection
    pub fn prune_orphan_ratings(&mut self) -> Receipt {
        let saved: HashSet<&str> = self.books.iter().map(|b| b.id.as_str()).collect();
        let before = self.ratings.len();
        self.ratings.retain(|id, _| saved.contains(id.as_str()));

        let count = before - self.ratings.len();
        if count == 0 {
            return Receipt::noop();
        }

        info!("Pruned {} orphaned rating(s)", count);
        self.commit_ratings(Change::OrphanRatingsPruned { count })
    }

    // ==================== Subscriptions ====================

    /// Register a listener for library events
    ///
    /// Listeners run synchronously after each mutation has been applied
    /// and written (or failed to write).
    pub fn subscribe<F>(&mut self, listener: F) -> Subscription
    where
        F: FnMut(&LibraryEvent, &Snapshot<'_>) + 'static,
    {
        self.listeners.add(Box::new(listener))
    }

    /// Remove a listener; returns false if it was already removed
    pub fn unsubscribe(&mut self, subscription: Subscription) -> bool {
        self.listeners.remove(subscription)
    }

    /// Number of registered listeners
    pub fn subscriber_count(&self) -> usize {
        self.listeners.len()
    }

    /// Read-only view of the current state
    pub fn snapshot(&self) -> Snapshot<'_> {
        Snapshot::new(&self.books, &self.ratings)
    }

    // ==================== Persistence ====================

    fn commit_collection(&mut self, change: Change) -> Receipt {
        let encoded = codec::encode_collection(&self.books);
        self.commit(COLLECTION_KEY, &encoded, change)
    }

    fn commit_ratings(&mut self, change: Change) -> Receipt {
        let encoded = codec::encode_ratings(&self.ratings);
        self.commit(RATINGS_KEY, &encoded, change)
    }

    /// Write the encoded structure, then tell subscribers
    fn commit(&mut self, key: &'static str, encoded: &str, change: Change) -> Receipt {
        let write_error = match self.write(key, encoded) {
            Ok(()) => {
                debug!("Persisted {} ({} bytes)", key, encoded.len());
                None
            }
            Err(e) => {
                warn!("Failed to persist {}, keeping change in memory: {}", key, e);
                self.notify(&LibraryEvent::PersistenceFailed {
                    key,
                    message: e.to_string(),
                });
                Some(e)
            }
        };

        self.notify(&LibraryEvent::from(&change));

        Receipt {
            change: Some(change),
            write_error,
        }
    }

    fn write(&mut self, key: &'static str, encoded: &str) -> Result<(), StorageError> {
        if self.unreadable.contains(&key) {
            // Only safe to write once the value we could not read is gone
            match self.store.get(key) {
                Ok(None) => {
                    info!("{} no longer in store, resuming writes", key);
                    self.unreadable.retain(|k| *k != key);
                }
                _ => {
                    return Err(StorageError::Unreadable {
                        key: key.to_string(),
                    })
                }
            }
        }

        self.store.set(key, encoded)
    }

    fn notify(&mut self, event: &LibraryEvent) {
        let snapshot = Snapshot::new(&self.books, &self.ratings);
        self.listeners.notify(event, &snapshot);
    }
}

/// Outcome of loading one structure
enum Rehydrated<T> {
    Loaded(T),
    /// The stored value was corrupt and has been removed
    Discarded,
    /// The store could not be read; the value was left in place
    Unreadable,
}

/// Load one structure from the store
fn rehydrate<S, T>(
    store: &mut S,
    key: &'static str,
    decode: fn(&str) -> Result<T, DecodeError>,
) -> Rehydrated<T>
where
    S: KeyValueStore,
    T: Default,
{
    let decoded = match store.get(key) {
        Ok(Some(raw)) => decode(&raw).map_err(|e| e.to_string()),
        Ok(None) => return Rehydrated::Loaded(T::default()),
        Err(e) if e.is_corrupt_value() => Err(e.to_string()),
        Err(e) => {
            warn!("Failed to read {}, starting empty and leaving it untouched: {}", key, e);
            return Rehydrated::Unreadable;
        }
    };

    match decoded {
        Ok(value) => Rehydrated::Loaded(value),
        Err(reason) => {
            warn!("Discarding corrupt {}: {}", key, reason);
            if let Err(e) = store.remove(key) {
                warn!("Failed to remove corrupt {}: {}", key, e);
            }
            Rehydrated::Discarded
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FileStore, MemoryStore};
    use std::cell::RefCell;
    use std::rc::Rc;
    use tempfile::TempDir;

    fn book(id: &str, title: &str) -> Book {
        Book::new(id).with_field("title", title)
    }

    fn empty_library() -> Library<MemoryStore> {
        Library::open(MemoryStore::new())
    }

    fn stored_books(library: &Library<MemoryStore>) -> Vec<Book> {
        let raw = library.store().get(COLLECTION_KEY).unwrap().unwrap();
        codec::decode_collection(&raw).unwrap()
    }

    fn stored_ratings(library: &Library<MemoryStore>) -> Ratings {
        let raw = library.store().get(RATINGS_KEY).unwrap().unwrap();
        codec::decode_ratings(&raw).unwrap()
    }

    /// Collect every event together with the state the listener saw
    fn record(library: &mut Library<MemoryStore>) -> Rc<RefCell<Vec<(LibraryEvent, usize, u8)>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        library.subscribe(move |event, snapshot| {
            sink.borrow_mut()
                .push((event.clone(), snapshot.books().len(), snapshot.rating("B1")));
        });
        seen
    }

    #[test]
    fn test_open_empty_store() {
        let library = empty_library();
        assert!(library.is_empty());
        assert!(library.ratings().is_empty());
        assert!(library.discarded_keys().is_empty());
    }

    #[test]
    fn test_add_and_query() {
        let mut library = empty_library();

        let receipt = library.add_to_library(book("B1", "X")).unwrap();
        assert_eq!(receipt.change, Some(Change::Added { id: "B1".into() }));
        assert!(receipt.is_durable());

        assert!(library.is_in_library("B1"));
        assert!(!library.is_in_library("B2"));
        assert_eq!(library.get_book("B1").unwrap().title(), Some("X"));
        assert_eq!(stored_books(&library), vec![book("B1", "X")]);
    }

    #[test]
    fn test_duplicate_add_keeps_first() {
        let mut library = empty_library();
        library.add_to_library(book("B1", "X")).unwrap();

        let err = library.add_to_library(book("B1", "Y")).unwrap_err();
        assert_eq!(err, LibraryError::DuplicateEntry { id: "B1".into() });

        assert_eq!(library.len(), 1);
        assert_eq!(library.books()[0].title(), Some("X"));
        assert_eq!(stored_books(&library), vec![book("B1", "X")]);
    }

    #[test]
    fn test_repeated_adds_stay_unique() {
        let mut library = empty_library();
        let ids = ["a", "b", "a", "c", "b", "a", "c", "d"];
        for id in ids {
            let _ = library.add_to_library(Book::new(id));
        }

        let saved: Vec<&str> = library.books().iter().map(|b| b.id.as_str()).collect();
        assert_eq!(saved, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_add_requires_id() {
        let mut library = empty_library();
        assert_eq!(
            library.add_to_library(Book::new("")).unwrap_err(),
            LibraryError::MissingId
        );
        assert_eq!(
            library.add_to_library(Book::new("  ")).unwrap_err(),
            LibraryError::MissingId
        );
        assert!(library.is_empty());
        assert!(library.store().is_empty());
    }

    #[test]
    fn test_re_add_after_remove_appends() {
        let mut library = empty_library();
        library.add_to_library(Book::new("a")).unwrap();
        library.add_to_library(Book::new("b")).unwrap();
        let _ = library.remove_from_library("a");
        library.add_to_library(Book::new("a")).unwrap();

        let saved: Vec<&str> = library.books().iter().map(|b| b.id.as_str()).collect();
        assert_eq!(saved, vec!["b", "a"]);
    }

    #[test]
    fn test_remove() {
        let mut library = empty_library();
        library.add_to_library(book("B1", "X")).unwrap();
        library.add_to_library(book("B2", "Y")).unwrap();

        let receipt = library.remove_from_library("B1");
        assert_eq!(receipt.change, Some(Change::Removed { id: "B1".into() }));
        assert!(!library.is_in_library("B1"));
        assert_eq!(stored_books(&library), vec![book("B2", "Y")]);
    }

    #[test]
    fn test_remove_missing_is_noop() {
        let mut library = empty_library();
        library.add_to_library(book("B1", "X")).unwrap();
        let before = library.books().to_vec();

        let receipt = library.remove_from_library("nope");
        assert!(receipt.is_noop());
        assert_eq!(library.books(), before.as_slice());
        assert!(!library.is_in_library("nope"));
    }

    #[test]
    fn test_rate_and_get() {
        let mut library = empty_library();
        assert_eq!(library.get_rating("B1"), 0);

        for value in 1..=5 {
            library.rate_book("B1", value).unwrap();
            assert_eq!(library.get_rating("B1") as i64, value);
        }

        library.rate_book("B1", 2).unwrap();
        assert_eq!(stored_ratings(&library).get("B1").unwrap().value(), 2);
    }

    #[test]
    fn test_invalid_rating_changes_nothing() {
        let mut library = empty_library();

        let err = library.rate_book("B1", 6).unwrap_err();
        assert_eq!(err, LibraryError::InvalidRating { value: 6 });
        assert_eq!(library.get_rating("B1"), 0);
        assert!(library.store().get(RATINGS_KEY).unwrap().is_none());

        library.rate_book("B1", 3).unwrap();
        assert!(library.rate_book("B1", 0).is_err());
        assert!(library.rate_book("B1", -2).is_err());
        assert_eq!(library.get_rating("B1"), 3);
        assert_eq!(stored_ratings(&library).get("B1").unwrap().value(), 3);
    }

    #[test]
    fn test_rate_requires_id() {
        let mut library = empty_library();
        assert_eq!(library.rate_book("", 3).unwrap_err(), LibraryError::MissingId);
    }

    #[test]
    fn test_rating_survives_removal() {
        let mut library = empty_library();
        library.add_to_library(book("B1", "X")).unwrap();
        library.rate_book("B1", 4).unwrap();

        let _ = library.remove_from_library("B1");
        assert_eq!(library.get_rating("B1"), 4);
        assert_eq!(stored_ratings(&library).get("B1").unwrap().value(), 4);
    }

    #[test]
    fn test_rated_books() {
        let mut library = empty_library();
        library.add_to_library(Book::new("a")).unwrap();
        library.add_to_library(Book::new("b")).unwrap();
        library.rate_book("b", 5).unwrap();
        library.rate_book("orphan", 1).unwrap();

        let rated = library.rated_books();
        assert_eq!(rated.len(), 1);
        assert_eq!(rated[0].0.id, "b");
        assert_eq!(rated[0].1.value(), 5);
    }

    #[test]
    fn test_prune_orphan_ratings() {
        let mut library = empty_library();
        library.add_to_library(Book::new("kept")).unwrap();
        library.rate_book("kept", 5).unwrap();
        library.rate_book("gone-1", 2).unwrap();
        library.rate_book("gone-2", 3).unwrap();

        let receipt = library.prune_orphan_ratings();
        assert_eq!(
            receipt.change,
            Some(Change::OrphanRatingsPruned { count: 2 })
        );
        assert_eq!(library.ratings().len(), 1);
        assert_eq!(library.get_rating("kept"), 5);
        assert_eq!(stored_ratings(&library).len(), 1);

        assert!(library.prune_orphan_ratings().is_noop());
    }

    #[test]
    fn test_reopen_restores_state() {
        let mut library = empty_library();
        library.add_to_library(book("B1", "X")).unwrap();
        library.add_to_library(book("B2", "Y")).unwrap();
        library.rate_book("B2", 5).unwrap();

        let reopened = Library::open(library.into_store());
        assert_eq!(reopened.books(), &[book("B1", "X"), book("B2", "Y")]);
        assert_eq!(reopened.get_rating("B2"), 5);
    }

    #[test]
    fn test_file_store_persists_across_sessions() {
        let temp_dir = TempDir::new().unwrap();

        {
            let mut library = Library::open(FileStore::new(temp_dir.path()));
            library.add_to_library(book("B1", "X")).unwrap();
            library.rate_book("B1", 4).unwrap();
        }

        let library = Library::open(FileStore::new(temp_dir.path()));
        assert!(library.is_in_library("B1"));
        assert_eq!(library.get_rating("B1"), 4);
    }

    #[test]
    fn test_corrupt_collection_self_heals() {
        let mut store = MemoryStore::new();
        store.set(COLLECTION_KEY, "[{\"id\": \"B1\",").unwrap();
        store.set(RATINGS_KEY, r#"{"B1":4}"#).unwrap();

        let mut library = Library::open(store);
        assert!(library.is_empty());
        assert_eq!(library.get_rating("B1"), 4);
        assert_eq!(library.discarded_keys(), &[COLLECTION_KEY]);
        assert!(library.store().get(COLLECTION_KEY).unwrap().is_none());

        let receipt = library.add_to_library(book("B2", "Y")).unwrap();
        assert!(receipt.is_durable());
        assert_eq!(stored_books(&library), vec![book("B2", "Y")]);
    }

    #[test]
    fn test_non_utf8_collection_self_heals() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(format!("{}.json", COLLECTION_KEY));
        std::fs::write(&path, [0xff, 0xfe, b'[']).unwrap();

        let mut library = Library::open(FileStore::new(temp_dir.path()));
        assert!(library.is_empty());
        assert_eq!(library.discarded_keys(), &[COLLECTION_KEY]);
        assert!(library.unreadable_keys().is_empty());
        assert!(!path.exists());

        library.add_to_library(book("B1", "X")).unwrap();
        let reopened = Library::open(library.into_store());
        assert!(reopened.is_in_library("B1"));
        assert!(reopened.discarded_keys().is_empty());
    }

    #[test]
    fn test_unreadable_value_is_not_overwritten() {
        let mut store = MemoryStore::new();
        store.set(COLLECTION_KEY, r#"[{"id":"B1"},{"id":"B2"}]"#).unwrap();
        store.fail_reads(true);

        let mut library = Library::open(store);
        assert!(library.is_empty());
        assert_eq!(library.unreadable_keys(), &[COLLECTION_KEY, RATINGS_KEY]);
        assert!(library.discarded_keys().is_empty());

        library.store_mut().fail_reads(false);
        let receipt = library.add_to_library(Book::new("B3")).unwrap();
        assert!(library.is_in_library("B3"));
        assert!(matches!(
            receipt.write_error,
            Some(StorageError::Unreadable { .. })
        ));
        assert!(receipt.warning().is_some());

        // Ratings were never stored, so nothing is at risk there
        let receipt = library.rate_book("B1", 4).unwrap();
        assert!(receipt.is_durable());
        assert_eq!(library.unreadable_keys(), &[COLLECTION_KEY]);

        let reopened = Library::open(library.into_store());
        let ids: Vec<&str> = reopened.books().iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["B1", "B2"]);
        assert_eq!(reopened.get_rating("B1"), 4);
    }

    #[test]
    fn test_payload_id_does_not_corrupt_collection() {
        let mut library = empty_library();
        library
            .add_to_library(Book::new("B1").with_field("title", "X"))
            .unwrap();
        let mut shadowed = Book::new("B2");
        shadowed.payload.insert("id".into(), serde_json::json!("B1"));
        library.add_to_library(shadowed).unwrap();
        assert!(!library.get_book("B2").unwrap().payload.contains_key("id"));

        let reopened = Library::open(library.into_store());
        assert!(reopened.discarded_keys().is_empty());
        let ids: Vec<&str> = reopened.books().iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["B1", "B2"]);
    }

    #[test]
    fn test_corrupt_ratings_self_heal() {
        let mut store = MemoryStore::new();
        store.set(RATINGS_KEY, r#"{"B1":11}"#).unwrap();

        let mut library = Library::open(store);
        assert!(library.ratings().is_empty());
        assert_eq!(library.discarded_keys(), &[RATINGS_KEY]);

        library.rate_book("B1", 2).unwrap();
        let reopened = Library::open(library.into_store());
        assert_eq!(reopened.get_rating("B1"), 2);
        assert!(reopened.discarded_keys().is_empty());
    }

    #[test]
    fn test_unversioned_keys_ignored() {
        let mut store = MemoryStore::new();
        store.set("library.collection", r#"[{"id":"old"}]"#).unwrap();

        let library = Library::open(store);
        assert!(library.is_empty());
    }

    #[test]
    fn test_write_failure_keeps_memory() {
        let mut library = empty_library();
        library.add_to_library(Book::new("B1")).unwrap();
        library.store_mut().fail_writes(true);

        let receipt = library.add_to_library(Book::new("B2")).unwrap();
        assert!(!receipt.is_durable());
        assert!(receipt.warning().is_some());
        assert!(library.is_in_library("B2"));
        assert_eq!(stored_books(&library).len(), 1);

        // The next successful write catches storage up
        library.store_mut().fail_writes(false);
        let receipt = library.add_to_library(Book::new("B3")).unwrap();
        assert!(receipt.is_durable());
        assert!(receipt.warning().is_none());
        let ids: Vec<String> = stored_books(&library).into_iter().map(|b| b.id).collect();
        assert_eq!(ids, vec!["B1", "B2", "B3"]);
    }

    #[test]
    fn test_quota_exceeded_keeps_memory() {
        let mut library = Library::open(MemoryStore::with_quota(64));
        let big = "x".repeat(100);

        let receipt = library
            .add_to_library(Book::new("B1").with_field("description", big))
            .unwrap();
        assert!(matches!(
            receipt.write_error,
            Some(StorageError::QuotaExceeded { .. })
        ));
        assert!(library.is_in_library("B1"));

        let receipt = library.rate_book("B1", 5).unwrap();
        assert!(receipt.is_durable());
    }

    #[test]
    fn test_listeners_see_committed_state() {
        let mut library = empty_library();
        let seen = record(&mut library);

        library.add_to_library(Book::new("B1")).unwrap();
        library.rate_book("B1", 4).unwrap();
        let _ = library.remove_from_library("B1");

        assert_eq!(
            *seen.borrow(),
            vec![
                (LibraryEvent::BookAdded { id: "B1".into() }, 1, 0),
                (
                    LibraryEvent::BookRated {
                        id: "B1".into(),
                        rating: Rating::new(4).unwrap()
                    },
                    1,
                    4
                ),
                (LibraryEvent::BookRemoved { id: "B1".into() }, 0, 4),
            ]
        );
    }

    #[test]
    fn test_listeners_told_about_duplicates() {
        let mut library = empty_library();
        library.add_to_library(Book::new("B1")).unwrap();
        let seen = record(&mut library);

        let _ = library.add_to_library(Book::new("B1"));
        assert_eq!(
            *seen.borrow(),
            vec![(LibraryEvent::DuplicateIgnored { id: "B1".into() }, 1, 0)]
        );
    }

    #[test]
    fn test_no_events_for_rejected_or_noop() {
        let mut library = empty_library();
        let seen = record(&mut library);

        let _ = library.rate_book("B1", 9);
        let _ = library.remove_from_library("B1");
        let _ = library.add_to_library(Book::new(""));
        let _ = library.prune_orphan_ratings();

        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn test_listeners_told_about_write_failures() {
        let mut library = empty_library();
        let seen = record(&mut library);
        library.store_mut().fail_writes(true);

        library.add_to_library(Book::new("B1")).unwrap();

        let events: Vec<LibraryEvent> = seen.borrow().iter().map(|(e, _, _)| e.clone()).collect();
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[0],
            LibraryEvent::PersistenceFailed {
                key: COLLECTION_KEY,
                ..
            }
        ));
        assert_eq!(events[1], LibraryEvent::BookAdded { id: "B1".into() });
    }

    #[test]
    fn test_multiple_subscribers_and_unsubscribe() {
        let mut library = empty_library();
        let first = Rc::new(RefCell::new(0));
        let second = Rc::new(RefCell::new(0));

        let counter = Rc::clone(&first);
        let handle = library.subscribe(move |_, _| *counter.borrow_mut() += 1);
        let counter = Rc::clone(&second);
        library.subscribe(move |_, _| *counter.borrow_mut() += 1);
        assert_eq!(library.subscriber_count(), 2);

        library.add_to_library(Book::new("a")).unwrap();
        assert!(library.unsubscribe(handle));
        assert!(!library.unsubscribe(handle));
        library.add_to_library(Book::new("b")).unwrap();

        assert_eq!(*first.borrow(), 1);
        assert_eq!(*second.borrow(), 2);
        assert_eq!(library.subscriber_count(), 1);
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            LibraryError::InvalidRating { value: 6 }.to_string(),
            "Invalid rating 6: ratings go from 1 to 5"
        );
        assert!(LibraryError::DuplicateEntry { id: "B1".into() }
            .to_string()
            .contains("B1"));
    }
}
