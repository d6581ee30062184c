pub mod diagnostic;
pub mod document;
pub mod latex;
pub mod parser;

pub use diagnostic::Diagnostic;
pub use document::{Document, DocumentNode, InlineNode};
pub use parser::Parser;
