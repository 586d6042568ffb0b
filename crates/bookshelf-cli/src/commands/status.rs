//! Status command handler

use anyhow::Result;

use bookshelf_core::{Config, FileStore, Library, COLLECTION_KEY, RATINGS_KEY};

use crate::output::{Output, OutputFormat};

/// Show status information
pub fn show(library: &Library<FileStore>, config: &Config, output: &Output) -> Result<()> {
    let rated_in_library = library.rated_books().len();
    let orphaned = library.ratings().len() - rated_in_library;
    let store = library.store();

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "store": {
                        "location": store.dir(),
                        "size": store.size_on_disk(),
                        "keys": [COLLECTION_KEY, RATINGS_KEY],
                        "discarded": library.discarded_keys(),
                        "unreadable": library.unreadable_keys()
                    },
                    "counts": {
                        "books": library.len(),
                        "ratings": library.ratings().len(),
                        "orphaned_ratings": orphaned
                    },
                    "catalog_url": config.catalog_url
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", library.len());
        }
        OutputFormat::Human => {
            println!("Bookshelf Status");
            println!("================");
            println!();
            println!("Storage:");
            println!("  Location: {}", store.dir().display());
            println!("  Size:     {} bytes", store.size_on_disk());
            for key in library.discarded_keys() {
                println!("  Reset:    {} was corrupt and has been cleared", key);
            }
            for key in library.unreadable_keys() {
                println!("  Locked:   {} could not be read, changes will not be saved", key);
            }
            println!();
            println!("Contents:");
            println!("  Books:    {}", library.len());
            println!("  Rated:    {}", rated_in_library);
            if orphaned > 0 {
                println!(
                    "  Orphaned: {} (ratings for removed books, clear with `bookshelf prune`)",
                    orphaned
                );
            }
            println!();
            println!("Catalog:    {}", config.catalog_url);
        }
    }

    Ok(())
}
