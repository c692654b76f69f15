//! Book page scraping.
//!
//! A catalog book page carries everything worth keeping about a book apart
//! from the text itself: title, author, genre, reader comments, and the
//! cover image reference. This module turns the raw HTML into a
//! [`BookMetadata`] value.
//!
//! Parsing is deliberately synchronous and allocation-final: the `scraper`
//! DOM is built, picked apart, and dropped inside [`parse_book_page`], so
//! the returned metadata is plain owned data that can cross task boundaries.
//!
//! # Example
//!
//! ```
//! use tululu_core::page::parse_book_page;
//! use url::Url;
//!
//! let html = r#"<html><body>
//!   <h1>Пески Марса :: <a href="/a770/">Кларк Артур</a></h1>
//!   <span class="d_book">Жанр книги: <a href="/l9/">Научная фантастика</a></span>
//!   <div class="bookimage"><img src="/shots/547.jpg"></div>
//! </body></html>"#;
//!
//! let base_url = Url::parse("https://tululu.org").unwrap();
//! let book = parse_book_page(html, &base_url).unwrap();
//! assert_eq!(book.title, "Пески Марса");
//! assert_eq!(book.author, "Кларк Артур");
//! ```

mod selectors;

use scraper::{ElementRef, Html};
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Everything scraped from one book page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookMetadata {
    /// Book title: the heading text before the `::` separator, trimmed.
    pub title: String,
    /// Author as linked from the heading, trimmed.
    pub author: String,
    /// First genre the catalog files the book under.
    pub genre: String,
    /// Reader comments in page order.
    pub comments: Vec<String>,
    /// Absolute URL of the cover image, when the page has one.
    pub image_url: Option<Url>,
}

/// Errors that can occur while scraping a book page.
///
/// Only the structural anchors every real book page carries are required;
/// a missing cover or empty comment list is normal, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The page has no `h1` heading to take the title from.
    #[error("book page has no title heading")]
    MissingTitle,

    /// The title heading has no author link.
    #[error("book page heading has no author link")]
    MissingAuthor,

    /// The page has no genre link.
    #[error("book page has no genre link")]
    MissingGenre,
}

/// Scrapes title, author, genre, comments and the cover URL from a book
/// page.
///
/// The cover reference is resolved against `base_url` here so callers only
/// ever see an absolute URL; an unresolvable `src` degrades to `None` rather
/// than failing the page.
///
/// # Errors
///
/// Returns [`ParseError`] if the page lacks its title heading, the author
/// link inside it, or the genre link.
pub fn parse_book_page(html: &str, base_url: &Url) -> Result<BookMetadata, ParseError> {
    let document = Html::parse_document(html);

    let heading = document
        .select(&selectors::HEADING)
        .next()
        .ok_or(ParseError::MissingTitle)?;
    // "Title :: Author" shares one heading; the part before the separator is
    // the title. A heading without the separator is all title.
    let title = text_of(&heading)
        .split("::")
        .next()
        .unwrap_or_default()
        .trim()
        .to_string();

    let author = heading
        .select(&selectors::ANCHOR)
        .next()
        .map(|link| text_of(&link))
        .ok_or(ParseError::MissingAuthor)?;

    let genre = document
        .select(&selectors::GENRE_SPAN)
        .next()
        .and_then(|span| span.select(&selectors::ANCHOR).next())
        .map(|link| text_of(&link))
        .ok_or(ParseError::MissingGenre)?;

    let comments = document
        .select(&selectors::COMMENT_BLOCK)
        .filter_map(|block| block.select(&selectors::COMMENT_TEXT).next())
        .map(|span| text_of(&span))
        .filter(|comment| !comment.is_empty())
        .collect();

    let image_url = document
        .select(&selectors::COVER_IMAGE)
        .next()
        .and_then(|img| img.value().attr("src"))
        .and_then(|src| match base_url.join(src) {
            Ok(url) => Some(url),
            Err(error) => {
                debug!(src, %error, "cover src does not resolve against base URL");
                None
            }
        });

    Ok(BookMetadata {
        title,
        author,
        genre,
        comments,
        image_url,
    })
}

/// Concatenated text of an element, trimmed.
fn text_of(element: &ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}
