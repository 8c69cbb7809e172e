//! Keyword relevance check for incoming posts.
//!
//! Matching is literal substring search over the lower-cased title and body:
//! no tokenisation, stemming or patterns, so `cat` matches `concatenate`.

use crate::types::{Keywords, Post};

/// Returns true when any keyword occurs in the post title or body.
///
/// An empty keyword set never matches.
pub fn matches(post: &Post, keywords: &Keywords) -> bool {
    if keywords.is_empty() {
        return false;
    }

    let title = post.title.to_lowercase();
    let content = post.content.to_lowercase();

    keywords
        .iter()
        .any(|keyword| title.contains(keyword) || content.contains(keyword))
}
