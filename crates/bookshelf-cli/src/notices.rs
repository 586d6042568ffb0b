//! Toast-style notices driven by library events
//!
//! The CLI is the library's only subscriber. Successful changes are
//! reported by the command that made them; this listener covers the
//! events a command cannot see as a plain result: duplicates that were
//! ignored and changes that could not be saved.

use tracing::debug;

use bookshelf_core::{FileStore, Library, LibraryEvent, Subscription};

use crate::output::{Output, OutputFormat};

/// Subscribe the notice printer to `library`
pub fn attach(library: &mut Library<FileStore>, format: OutputFormat) -> Subscription {
    library.subscribe(move |event, snapshot| {
        debug!(
            "Library event {:?} ({} book(s), {} rating(s))",
            event,
            snapshot.books().len(),
            snapshot.ratings().len()
        );

        let output = Output::new(format);
        if let Some(notice) = notice_for(event) {
            match event {
                LibraryEvent::PersistenceFailed { .. } => output.warning(&notice),
                _ => output.message(&notice),
            }
        }
    })
}

/// Text shown for an event, if it deserves one
fn notice_for(event: &LibraryEvent) -> Option<String> {
    match event {
        LibraryEvent::DuplicateIgnored { id } => {
            Some(format!("Book {} is already in your library", id))
        }
        LibraryEvent::PersistenceFailed { key, message } => Some(format!(
            "Change kept for this session but {} could not be saved: {}",
            key, message
        )),
        _ => None,
    }
}
