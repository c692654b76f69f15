//! Redirect-based availability detection.
//!
//! The catalog never answers a missing book ID with 404. Instead it redirects
//! to the front page (or a "book not found" landing page) and returns 200
//! there. A fetch that arrived without redirects therefore means the book
//! exists; any redirect on the way means it does not.

use url::Url;

/// Whether a catalog resource actually exists at its canonical URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    /// The server answered directly; the resource is real.
    Present,

    /// The server redirected away; the resource does not exist.
    Absent {
        /// Where the redirect chain ended up (usually the front page).
        via: Url,
    },
}

impl Availability {
    /// Derives availability from a fetch's redirect history.
    ///
    /// `history` holds the URLs that answered with a redirect, in hop order;
    /// `final_url` is where the terminal response came from.
    #[must_use]
    pub fn from_redirects(history: &[Url], final_url: &Url) -> Self {
        if history.is_empty() {
            Self::Present
        } else {
            Self::Absent {
                via: final_url.clone(),
            }
        }
    }

    /// Returns true if the resource exists.
    #[must_use]
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present)
    }

    /// Returns true if the resource was redirected away.
    #[must_use]
    pub fn is_absent(&self) -> bool {
        !self.is_present()
    }
}
