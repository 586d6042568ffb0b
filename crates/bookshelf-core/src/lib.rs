//! Bookshelf Core Library
//!
//! This crate provides the core functionality for Bookshelf, a personal
//! book collection: the books a user has saved and the star ratings they
//! have given.
//!
//! # Architecture
//!
//! - **Library**: in-memory source of truth, written through to storage
//!   after every mutation
//! - **Storage**: a small synchronous key-value store holding one JSON
//!   value per structure
//!
//! All queries are served directly from memory.
//!
//! # Quick Start
//!
//! ```text
//! let store = FileStore::new(config.store_dir());
//! let mut library = Library::open(store);
//!
//! // Save a book and rate it
//! library.add_to_library(Book::new("zyTCAlFPjgYC"))?;
//! library.rate_book("zyTCAlFPjgYC", 4)?;
//!
//! // Query
//! assert!(library.is_in_library("zyTCAlFPjgYC"));
//! assert_eq!(library.get_rating("zyTCAlFPjgYC"), 4);
//! ```
//!
//! # Modules
//!
//! - `library`: the library state manager (main entry point)
//! - `models`: books and ratings
//! - `codec`: persisted string format
//! - `events`: change notification
//! - `storage`: key-value stores
//! - `config`: application configuration

pub mod codec;
pub mod config;
pub mod events;
pub mod library;
pub mod models;
pub mod storage;

pub use codec::DecodeError;
pub use config::Config;
pub use events::{LibraryEvent, Snapshot, Subscription};
pub use library::{Change, Library, LibraryError, Receipt, COLLECTION_KEY, RATINGS_KEY};
pub use models::{Book, Rating, Ratings};
pub use storage::{FileStore, KeyValueStore, MemoryStore, StorageError, StorageResult};
