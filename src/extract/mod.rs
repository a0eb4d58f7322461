pub mod catalog;
pub mod field;

pub use catalog::SelectorCatalog;
pub use field::{FieldQuery, NodeQuery, ValueSource};
