//! Change notification
//!
//! Listeners registered with [`Library::subscribe`](crate::Library::subscribe)
//! are called synchronously once a mutation and its write to storage have
//! finished. Each call gets the event plus a read-only view of the library
//! as it stands after the mutation.

use crate::models::{Book, Rating, Ratings};

/// Something that happened to the library
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LibraryEvent {
    /// A book was appended to the collection
    BookAdded { id: String },
    /// A book was removed from the collection
    BookRemoved { id: String },
    /// A book was rated
    BookRated { id: String, rating: Rating },
    /// An add was ignored because the book is already saved
    DuplicateIgnored { id: String },
    /// Ratings for books no longer in the collection were dropped
    OrphanRatingsPruned { count: usize },
    /// A mutation is held in memory but could not be written to storage
    PersistenceFailed { key: &'static str, message: String },
}

/// Read-only view of the committed library state
#[derive(Debug, Clone, Copy)]
pub struct Snapshot<'a> {
    books: &'a [Book],
    ratings: &'a Ratings,
}

impl<'a> Snapshot<'a> {
    pub(crate) fn new(books: &'a [Book], ratings: &'a Ratings) -> Self {
        Self { books, ratings }
    }

    /// Books in insertion order
    pub fn books(&self) -> &'a [Book] {
        self.books
    }

    /// All ratings, including ratings for removed books
    pub fn ratings(&self) -> &'a Ratings {
        self.ratings
    }

    /// Whether a book is in the collection
    pub fn contains(&self, id: &str) -> bool {
        self.books.iter().any(|b| b.id == id)
    }

    /// Rating for a book, 0 when unrated
    pub fn rating(&self, id: &str) -> u8 {
        self.ratings.get(id).map_or(0, |r| r.value())
    }
}

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

type Listener = Box<dyn FnMut(&LibraryEvent, &Snapshot<'_>)>;

/// Registered listeners
#[derive(Default)]
pub(crate) struct Listeners {
    next_id: u64,
    entries: Vec<(Subscription, Listener)>,
}

impl Listeners {
    pub(crate) fn add(&mut self, listener: Listener) -> Subscription {
        let handle = Subscription(self.next_id);
        self.next_id += 1;
        self.entries.push((handle, listener));
        handle
    }

    pub(crate) fn remove(&mut self, handle: Subscription) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(h, _)| *h != handle);
        self.entries.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn notify(&mut self, event: &LibraryEvent, snapshot: &Snapshot<'_>) {
        for (_, listener) in &mut self.entries {
            listener(event, snapshot);
        }
    }
}

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners")
            .field("count", &self.entries.len())
            .finish()
    }
}
