use anyhow::{bail, Context, Result};
use console::style;
use std::path::{Path, PathBuf};
use taleplay_config::ConfigManager;
use taleplay_core::{format_clock, Book, BookId, Chapter, PersistenceStore};
use taleplay_database::SqliteStore;
use taleplay_engine::probe_duration;

/// Extensions the decoder can read
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "m4a", "m4b", "aac", "flac", "ogg", "wav"];

pub fn init(manager: &ConfigManager, created: bool) {
    if created {
        println!("{} Wrote default config", style("✓").green().bold());
    }
    println!("  Config: {}", manager.config_path().display());
    println!("  Library ready");
}

/// Registers every audio file in `dir` as one chapter of a new book
pub async fn add_book(
    store: &SqliteStore,
    dir: &Path,
    title: Option<&str>,
    author: Option<&str>,
) -> Result<Book> {
    if !dir.is_dir() {
        bail!("Not a directory: {}", dir.display());
    }
    let dir = dir
        .canonicalize()
        .with_context(|| format!("Failed to resolve {}", dir.display()))?;

    let files = collect_audio_files(&dir)?;
    if files.is_empty() {
        bail!("No audio files found in {}", dir.display());
    }

    let title = title
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| title_from_path(&dir));
    let mut book = Book::new(title);
    if let Some(author) = author {
        book = book.with_author(author);
    }

    let book_id = book.id;
    let chapters = tokio::task::spawn_blocking(move || build_chapters(book_id, &files))
        .await
        .context("Chapter scan was interrupted")?;

    store
        .add_book(&book, &chapters)
        .await
        .context("Failed to add book to the library")?;

    let total: f64 = chapters.iter().map(|c| c.duration_secs).sum();
    println!("{} Book added", style("✓").green().bold());
    println!("  ID: {}", book.id);
    println!("  Title: {}", book.title);
    if let Some(author) = &book.author {
        println!("  Author: {}", author);
    }
    println!("  Chapters: {} ({})", chapters.len(), format_clock(total));

    Ok(book)
}

pub async fn list_books(store: &SqliteStore) -> Result<()> {
    let books = store.books().await.context("Failed to list books")?;

    if books.is_empty() {
        println!("No books in library. Use 'add' to import a directory of chapters.");
        return Ok(());
    }

    println!("\n{} Books in Library", style(books.len()).bold().cyan());
    println!("{}", "=".repeat(80));

    for book in books {
        println!("\n{}", style(&book.title).bold());
        if let Some(author) = &book.author {
            println!("  by {}", author);
        }
        println!(
            "  ID: {} | Chapter {} at {}",
            book.id,
            book.last_chapter_index + 1,
            format_clock(book.last_position_secs)
        );
    }

    Ok(())
}

pub async fn show_chapters(store: &SqliteStore, id: &str) -> Result<()> {
    let book_id = parse_book_id(id)?;
    let book = store.book(book_id).await.context("Failed to get book")?;
    let chapters = store
        .get_chapters(book_id)
        .await
        .context("Failed to get chapters")?;

    println!("\n{}", style(&book.title).bold().cyan());
    println!("{}", "=".repeat(80));

    for (index, chapter) in chapters.iter().enumerate() {
        let marker = if index as u32 == book.last_chapter_index {
            style("▶").green().to_string()
        } else {
            " ".to_string()
        };
        println!(
            "{} {:>3}. {:<48} {} / {}",
            marker,
            index + 1,
            truncate(&chapter.title, 48),
            format_clock(chapter.last_position_secs),
            format_clock(chapter.duration_secs)
        );
    }

    Ok(())
}

pub async fn remove_book(store: &SqliteStore, id: &str, force: bool) -> Result<()> {
    let book_id = parse_book_id(id)?;
    let book = store.book(book_id).await.context("Failed to get book")?;

    if !force {
        println!("Remove '{}' and its progress? (y/N)", book.title);
        let mut input = String::new();
        std::io::stdin()
            .read_line(&mut input)
            .context("Failed to read input")?;

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Removal cancelled.");
            return Ok(());
        }
    }

    store
        .remove_book(book_id)
        .await
        .context("Failed to remove book")?;

    println!("{} Book removed: {}", style("✓").green().bold(), book.title);
    Ok(())
}

pub fn parse_book_id(id: &str) -> Result<BookId> {
    BookId::from_string(id.trim()).with_context(|| format!("Invalid book ID: {}", id))
}

/// Audio files directly inside `dir`, sorted by file name
pub(crate) fn collect_audio_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))? {
        let path = entry.context("Failed to read directory entry")?.path();
        if path.is_file() && is_audio_file(&path) {
            files.push(path);
        }
    }

    files.sort_by_key(|p| {
        p.file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default()
    });
    Ok(files)
}

fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| AUDIO_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

fn build_chapters(book_id: BookId, files: &[PathBuf]) -> Vec<Chapter> {
    files
        .iter()
        .enumerate()
        .map(|(ordinal, path)| {
            let duration = probe_duration(path).unwrap_or_else(|e| {
                log::warn!("Could not read length of {}: {}", path.display(), e);
                0.0
            });
            Chapter::new(book_id, title_from_path(path), ordinal as u32, path.clone())
                .with_duration(duration)
        })
        .collect()
}

/// Human title from a file or directory name
pub(crate) fn title_from_path(path: &Path) -> String {
    let stem = if path.is_dir() {
        path.file_name()
    } else {
        path.file_stem()
    };

    let title = stem
        .map(|s| s.to_string_lossy().replace('_', " "))
        .unwrap_or_default();
    let title = title.trim();

    if title.is_empty() {
        "Untitled".to_string()
    } else {
        title.to_string()
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
