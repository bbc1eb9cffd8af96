//! Command implementations for the Archive Alchemist CLI.

pub mod add;
pub mod append;
pub mod extract;
pub mod list;
pub mod modify;
pub mod polyglot;
pub mod read;
pub mod remove;

pub use add::{cmd_add, cmd_replace};
pub use append::cmd_append;
pub use extract::cmd_extract;
pub use list::cmd_list;
pub use modify::cmd_modify;
pub use polyglot::cmd_polyglot;
pub use read::cmd_read;
pub use remove::cmd_remove;

/// Result type of every command.
pub type CmdResult = Result<(), Box<dyn std::error::Error>>;
