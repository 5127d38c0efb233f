//! Build-context access behind a trait so context checks run against a mock in tests

mod mock;
mod real;
mod r#trait;

pub use mock::MockFileSystem;
pub use r#trait::{ContextEntry, EntryKind, FileSystem};
pub use real::RealFileSystem;
