//! Data models for the wikistore backend.
//!
//! Wire representations use camelCase field naming to match the REST contract.

mod attachment;
mod document;
mod history;
mod object;
mod version;

pub use attachment::*;
pub use document::*;
pub use history::*;
pub use object::*;
pub use version::*;
