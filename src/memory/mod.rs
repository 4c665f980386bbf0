//! Conversation memory for the chat service.
//!
//! - `message`: role/content pairs
//! - `history`: bounded FIFO context window
//! - `title`: conversation title derivation

pub mod history;
pub mod message;
pub mod title;

pub use history::{BoundedHistory, DEFAULT_HISTORY_LEN};
pub use message::{Message, Role};
pub use title::{DEFAULT_TITLE, TitleStrategy};
