//! Title registry (`titledb.xml`) reading and writing.

pub mod document;
pub mod service;

pub use document::{Element, Node, RegistryDocument};
pub use service::{load_document, FileTitleRegistry};
