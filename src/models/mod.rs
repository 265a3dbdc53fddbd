pub mod entry;
pub mod tag;
pub mod user;

pub use entry::Entry;
pub use tag::{EntryTag, Tag};
pub use user::User;
