use std::collections::HashMap;

use crate::api::{Comment, CommentId, PageToken};

/// Where pagination stands for one list of comments
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum Cursor {
    /// Nothing was fetched yet
    #[default]
    Start,

    /// Some pages were fetched, this token fetches the next one
    Next(PageToken),

    /// The last page was fetched
    Exhausted,
}

impl Cursor {
    pub fn has_more(&self) -> bool {
        !matches!(self, Cursor::Exhausted)
    }

    /// Token to send along with the next page request
    pub fn token(&self) -> Option<PageToken> {
        match self {
            Cursor::Next(t) => Some(t.clone()),
            Cursor::Start | Cursor::Exhausted => None,
        }
    }

    pub fn advance(&mut self, next: Option<PageToken>) {
        *self = match next {
            Some(t) => Cursor::Next(t),
            None => Cursor::Exhausted,
        };
    }
}

/// The locally known replies to one root comment
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ReplySet {
    /// Replies fetched or received so far, a subset of all the replies
    pub loaded: Vec<Comment>,
    pub cursor: Cursor,
    pub is_open: bool,
    pub draft_text: String,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Location {
    Root(usize),
    Reply { parent: CommentId, index: usize },
}

/// In-memory view of the comments of one post
///
/// Roots are kept in server order (newest first) and are never re-sorted. All
/// mutations go through the idempotent `apply_*` functions, see `reconcile.rs`.
#[derive(Clone, Debug, Default)]
pub struct CommentStore {
    pub(crate) roots: Vec<Comment>,
    pub(crate) root_cursor: Cursor,
    pub(crate) root_draft: String,
    pub(crate) replies: HashMap<CommentId, ReplySet>,
}

impl CommentStore {
    pub fn new() -> CommentStore {
        CommentStore::default()
    }

    pub fn root_comments(&self) -> &[Comment] {
        &self.roots
    }

    pub fn root_cursor(&self) -> &Cursor {
        &self.root_cursor
    }

    pub fn replies(&self, parent: CommentId) -> Option<&ReplySet> {
        self.replies.get(&parent)
    }

    pub fn root_index(&self, id: CommentId) -> Option<usize> {
        self.roots.iter().position(|c| c.id == id)
    }

    pub fn is_root(&self, id: CommentId) -> bool {
        self.root_index(id).is_some()
    }

    pub fn contains(&self, id: CommentId) -> bool {
        self.locate(id).is_some()
    }

    /// Finds a comment, searching the roots first and then the loaded replies
    pub fn locate(&self, id: CommentId) -> Option<Location> {
        if let Some(i) = self.root_index(id) {
            return Some(Location::Root(i));
        }
        self.replies.iter().find_map(|(parent, set)| {
            set.loaded
                .iter()
                .position(|c| c.id == id)
                .map(|index| Location::Reply {
                    parent: *parent,
                    index,
                })
        })
    }

    pub fn get(&self, id: CommentId) -> Option<&Comment> {
        match self.locate(id)? {
            Location::Root(i) => self.roots.get(i),
            Location::Reply { parent, index } => self.replies.get(&parent)?.loaded.get(index),
        }
    }

    pub(crate) fn get_mut(&mut self, id: CommentId) -> Option<&mut Comment> {
        match self.locate(id)? {
            Location::Root(i) => self.roots.get_mut(i),
            Location::Reply { parent, index } => {
                self.replies.get_mut(&parent)?.loaded.get_mut(index)
            }
        }
    }

    /// Returns the reply set of `parent`, creating it if need be
    ///
    /// Returns None if `parent` is not a loaded root comment.
    pub(crate) fn reply_set_mut(&mut self, parent: CommentId) -> Option<&mut ReplySet> {
        if !self.is_root(parent) {
            return None;
        }
        Some(self.replies.entry(parent).or_default())
    }

    /// Opens or closes the replies of a root comment
    ///
    /// Returns false if `parent` is not a loaded root comment. Closing replies
    /// that were never opened does not create a reply set.
    pub fn set_reply_open(&mut self, parent: CommentId, open: bool) -> bool {
        if !open {
            if let Some(set) = self.replies.get_mut(&parent) {
                set.is_open = false;
            }
            return self.is_root(parent);
        }
        match self.reply_set_mut(parent) {
            Some(set) => {
                set.is_open = true;
                true
            }
            None => false,
        }
    }

    pub fn is_reply_open(&self, parent: CommentId) -> bool {
        self.replies.get(&parent).map(|s| s.is_open).unwrap_or(false)
    }

    /// Draft of the composer for `parent`'s replies, or for new root comments
    pub fn draft(&self, parent: Option<CommentId>) -> &str {
        match parent {
            None => &self.root_draft,
            Some(p) => self
                .replies
                .get(&p)
                .map(|s| &s.draft_text as &str)
                .unwrap_or(""),
        }
    }

    pub fn set_draft(&mut self, parent: Option<CommentId>, text: String) -> bool {
        match parent {
            None => {
                self.root_draft = text;
                true
            }
            Some(p) => match self.reply_set_mut(p) {
                Some(set) => {
                    set.draft_text = text;
                    true
                }
                None => false,
            },
        }
    }

    /// Iterates over roots and their loaded replies, each root immediately
    /// followed by its replies
    pub fn probe_order(&self) -> impl Iterator<Item = (Location, &Comment)> + '_ {
        self.roots.iter().enumerate().flat_map(move |(i, root)| {
            let replies = self
                .replies
                .get(&root.id)
                .map(|s| &s.loaded[..])
                .unwrap_or(&[]);
            std::iter::once((Location::Root(i), root)).chain(replies.iter().enumerate().map(
                move |(index, c)| {
                    (
                        Location::Reply {
                            parent: root.id,
                            index,
                        },
                        c,
                    )
                },
            ))
        })
    }

    pub fn probe(&self, id: CommentId) -> Option<Location> {
        self.probe_order()
            .find(|(_, c)| c.id == id)
            .map(|(loc, _)| loc)
    }

    /// Total number of comments held, roots and replies together
    pub fn len(&self) -> usize {
        self.roots.len() + self.replies.values().map(|s| s.loaded.len()).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
