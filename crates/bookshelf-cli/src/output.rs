//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use bookshelf_core::{Book, Rating};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// A book with its place in the user's library
pub struct BookView<'a> {
    pub book: &'a Book,
    pub in_library: bool,
    pub rating: u8,
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Check if output is in quiet mode
    pub fn is_quiet(&self) -> bool {
        matches!(self.format, OutputFormat::Quiet)
    }

    /// Print a single book with full details
    pub fn print_book(&self, view: &BookView<'_>) {
        let book = view.book;
        match self.format {
            OutputFormat::Human => {
                println!("ID:          {}", book.id);
                println!("Title:       {}", book.title().unwrap_or("(untitled)"));
                if let Some(subtitle) = book.subtitle() {
                    println!("Subtitle:    {}", subtitle);
                }
                println!("Authors:     {}", join_or_na(&book.authors()));
                if let Some(publisher) = book.publisher() {
                    println!("Publisher:   {}", publisher);
                }
                if let Some(date) = book.published_date() {
                    println!("Published:   {}", date);
                }
                if let Some(pages) = book.page_count() {
                    println!("Pages:       {}", pages);
                }
                let categories = book.categories();
                if !categories.is_empty() {
                    println!("Categories:  {}", categories.join(", "));
                }
                if let Some(isbn) = book.isbn() {
                    println!("ISBN:        {}", isbn);
                }
                println!(
                    "In library:  {}",
                    if view.in_library { "yes" } else { "no" }
                );
                println!("Rating:      {}", stars(view.rating));

                if let Some(description) = book.description() {
                    println!();
                    println!("{}", description);
                }
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({
                        "book": book,
                        "in_library": view.in_library,
                        "rating": view.rating
                    })
                );
            }
            OutputFormat::Quiet => {
                println!("{}", book.id);
            }
        }
    }

    /// Print a list of books
    pub fn print_books(&self, books: &[BookView<'_>], empty_message: &str) {
        match self.format {
            OutputFormat::Human => {
                if books.is_empty() {
                    println!("{}", empty_message);
                    return;
                }
                for view in books {
                    let marker = if view.in_library { "*" } else { " " };
                    println!(
                        "{} {:<14} | {} | {} | {}",
                        marker,
                        truncate(&view.book.id, 14),
                        truncate(view.book.title().unwrap_or("(untitled)"), 40),
                        truncate(&join_or_na(&view.book.authors()), 30),
                        stars(view.rating)
                    );
                }
                println!("\n{} book(s)", books.len());
            }
            OutputFormat::Json => {
                let items: Vec<_> = books
                    .iter()
                    .map(|v| {
                        serde_json::json!({
                            "book": v.book,
                            "in_library": v.in_library,
                            "rating": v.rating
                        })
                    })
                    .collect();
                println!("{}", serde_json::Value::Array(items));
            }
            OutputFormat::Quiet => {
                for view in books {
                    println!("{}", view.book.id);
                }
            }
        }
    }

    /// Print a rating change
    pub fn print_rating(&self, id: &str, rating: Rating) {
        match self.format {
            OutputFormat::Human => println!("✓ Rated {}: {}", id, stars(rating.value())),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "id": id, "rating": rating})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print a soft warning (to stderr, so JSON on stdout stays clean)
    pub fn warning(&self, message: &str) {
        if !self.is_quiet() {
            eprintln!("⚠ {}", message);
        }
    }

    /// Check if we should prompt for confirmation
    pub fn should_prompt(&self) -> bool {
        self.format == OutputFormat::Human
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

/// Render a rating as five stars, or a hint when unrated
pub fn stars(rating: u8) -> String {
    if rating == 0 {
        return "unrated".to_string();
    }
    let filled = usize::from(rating.min(Rating::MAX));
    format!(
        "{}{}",
        "★".repeat(filled),
        "☆".repeat(usize::from(Rating::MAX) - filled)
    )
}

fn join_or_na(items: &[&str]) -> String {
    if items.is_empty() {
        "N/A".to_string()
    } else {
        items.join(", ")
    }
}

/// Truncate a string to max characters, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
