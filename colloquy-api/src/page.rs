use crate::Comment;

/// Opaque pagination token handed out by the server
///
/// Nothing on the client side ever looks inside it, it is only sent back as-is
/// to fetch the following page.
#[derive(Clone, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct PageToken(pub String);

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Page {
    /// Comments in server order (newest first)
    pub comments: Vec<Comment>,

    /// Set iff there are more comments to fetch after this page
    pub next_page_token: Option<PageToken>,
}

impl Page {
    pub fn last(comments: Vec<Comment>) -> Page {
        Page {
            comments,
            next_page_token: None,
        }
    }
}
