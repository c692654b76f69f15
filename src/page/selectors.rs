//! CSS selectors for the catalog's book page markup.
//!
//! All selectors are compiled once and shared. Keeping them in one place
//! means a markup change on the site is a one-file fix.

use std::sync::LazyLock;

use scraper::Selector;

macro_rules! selector {
    ($name:ident, $css:expr) => {
        #[allow(clippy::expect_used)]
        pub(super) static $name: LazyLock<Selector> =
            LazyLock::new(|| Selector::parse($css).expect("selector literal must parse"));
    };
}

// The book page carries title and author in its sole h1, shaped
// "Title :: Author" with the author usually wrapped in a link.
selector!(HEADING, "h1");
// Genre links sit inside the first span.d_book.
selector!(GENRE_SPAN, "span.d_book");
selector!(ANCHOR, "a");
// Reader comments are div.texts blocks; the text itself is in a nested span.
selector!(COMMENT_BLOCK, "div.texts");
selector!(COMMENT_TEXT, "span");
selector!(COVER_IMAGE, "div.bookimage img");
