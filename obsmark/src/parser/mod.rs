mod structural;

use pulldown_cmark::Options;

use crate::document::Document;

/// Markdown extensions enabled for every parse.
pub fn options() -> Options {
    Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TABLES | Options::ENABLE_MATH
}

/// Parser entry point.
pub struct Parser {
    source: String,
}

impl Parser {
    pub fn new(source: String) -> Self {
        Parser { source }
    }

    /// Parse the source Markdown into a Document.
    pub fn parse(&self) -> Document {
        structural::parse_document(&self.source)
    }
}
