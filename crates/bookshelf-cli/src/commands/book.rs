//! Book command handlers

use anyhow::{Context, Result};

use bookshelf_core::{Book, Change, FileStore, Library, LibraryError};

use crate::catalog::CatalogClient;
use crate::editor::confirm;
use crate::output::{BookView, Output, OutputFormat};

type Shelf = Library<FileStore>;

/// Search the catalog
pub async fn search(
    library: &Shelf,
    catalog: &CatalogClient,
    query: String,
    output: &Output,
) -> Result<()> {
    let books = catalog.search(&query).await;
    let views: Vec<_> = books.iter().map(|b| view(library, b)).collect();
    output.print_books(&views, &format!("No books found for \"{}\".", query.trim()));
    Ok(())
}

/// Show a few featured books with covers
pub async fn featured(
    library: &Shelf,
    catalog: &CatalogClient,
    category: Option<String>,
    output: &Output,
) -> Result<()> {
    let (category, books) = catalog.featured(category.as_deref()).await;

    if matches!(output.format, OutputFormat::Human) {
        println!("Featured: {}\n", category);
    }
    let views: Vec<_> = books.iter().map(|b| view(library, b)).collect();
    output.print_books(&views, "No books found. Try again in a moment.");
    Ok(())
}

/// Show book details
///
/// Saved books are shown from the library; others are fetched from the
/// catalog.
pub async fn show(
    library: &Shelf,
    catalog: &CatalogClient,
    id: String,
    output: &Output,
) -> Result<()> {
    let fetched;
    let book = match library.get_book(&id) {
        Some(book) => book,
        None => {
            fetched = catalog
                .get_by_id(&id)
                .await
                .ok_or_else(|| anyhow::anyhow!("Book with ID {} not found", id))?;
            &fetched
        }
    };

    output.print_book(&view(library, book));
    Ok(())
}

/// Fetch a book from the catalog and add it to the library
pub async fn add(
    library: &mut Shelf,
    catalog: &CatalogClient,
    id: String,
    output: &Output,
) -> Result<()> {
    // Skip the network round trip for books we already have
    let book = if library.is_in_library(&id) {
        Book::new(id.as_str())
    } else {
        catalog
            .get_by_id(&id)
            .await
            .ok_or_else(|| anyhow::anyhow!("Book with ID {} not found", id))?
    };

    let title = book.title().unwrap_or("(untitled)").to_string();
    match library.add_to_library(book) {
        Ok(_) => {
            output.success(&format!("Added to library: {} - {}", id, title));
            Ok(())
        }
        // Already reported by the notice listener
        Err(LibraryError::DuplicateEntry { .. }) => Ok(()),
        Err(e) => Err(e).context("Failed to add book"),
    }
}

/// Remove a book from the library
pub fn remove(library: &mut Shelf, id: String, output: &Output) -> Result<()> {
    let Some(book) = library.get_book(&id) else {
        output.message(&format!("Book {} is not in your library.", id));
        return Ok(());
    };

    if output.should_prompt() {
        println!(
            "Remove from library: {} - {}",
            book.id,
            book.title().unwrap_or("(untitled)")
        );
        if !confirm("Are you sure?")? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let receipt = library.remove_from_library(&id);
    if let Some(Change::Removed { id }) = receipt.change {
        output.success(&format!("Removed from library: {}", id));
    }
    Ok(())
}

/// List saved books in the order they were added
pub fn list(library: &Shelf, output: &Output) -> Result<()> {
    let views: Vec<_> = library.books().iter().map(|b| view(library, b)).collect();
    output.print_books(
        &views,
        "Your bookshelf is empty. Search for books and add them to your library!",
    );
    Ok(())
}

/// Rate a book
pub fn rate(library: &mut Shelf, id: String, rating: i64, output: &Output) -> Result<()> {
    let receipt = library.rate_book(&id, rating)?;

    if let Some(Change::Rated { id, rating }) = receipt.change {
        output.print_rating(&id, rating);
    }
    Ok(())
}

/// Drop ratings for books no longer in the library
pub fn prune(library: &mut Shelf, output: &Output) -> Result<()> {
    let receipt = library.prune_orphan_ratings();
    match receipt.change {
        Some(Change::OrphanRatingsPruned { count }) => {
            output.success(&format!("Removed {} rating(s) for books not in your library", count));
        }
        _ => output.message("No orphaned ratings."),
    }
    Ok(())
}

fn view<'a>(library: &Shelf, book: &'a Book) -> BookView<'a> {
    BookView {
        book,
        in_library: library.is_in_library(&book.id),
        rating: library.get_rating(&book.id),
    }
}
