//! Database query operations organized by entity

pub mod books;
pub mod chapters;
pub mod progress;
pub mod settings;

// Re-export commonly used query functions
pub use books::{delete_book, get_book, list_books, save_book};
pub use chapters::{get_book_chapters, get_chapter, save_chapters};
pub use progress::{get_progress, latest_progress, save_progress};
pub use settings::{
    get_last_opened_book, get_playback_speed, get_stored_playback_speed, set_last_opened_book,
    set_playback_speed,
};
