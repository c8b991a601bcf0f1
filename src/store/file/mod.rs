//! File-based storage backends.

mod content;
mod history;
mod records;
mod session;

pub use content::FileContentStore;
pub use history::FileHistoryStore;
pub use records::FileRecordStore;
pub use session::FileSessionStore;
