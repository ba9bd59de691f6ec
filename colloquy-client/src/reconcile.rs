use crate::{
    api::{Comment, CommentId, FeedMessage},
    CommentStore, Location,
};

/// Where a mutation comes from
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Origin {
    /// Response to a page fetch
    Page,
    /// Push event from the comment feed
    Feed,
    /// Response to an action of the current user
    Local,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Mutation {
    Insert {
        comment: Comment,
        origin: Origin,
        /// New reply count of the comment's parent, if known
        parent_reply_count: Option<u32>,
    },
    Remove(CommentId),
    ReplyCount {
        id: CommentId,
        count: u32,
    },
}

impl Mutation {
    pub fn insert(comment: Comment, origin: Origin) -> Mutation {
        Mutation::Insert {
            comment,
            origin,
            parent_reply_count: None,
        }
    }
}

impl From<FeedMessage> for Mutation {
    fn from(msg: FeedMessage) -> Mutation {
        match msg {
            FeedMessage::CommentCreated {
                comment,
                parent_reply_count,
            } => Mutation::Insert {
                comment,
                origin: Origin::Feed,
                parent_reply_count,
            },
            FeedMessage::CommentDeleted { comment } => Mutation::Remove(comment.id),
            FeedMessage::CommentReplyCountChanged {
                comment_id,
                new_count,
            } => Mutation::ReplyCount {
                id: comment_id,
                count: new_count,
            },
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Outcome {
    Inserted(Location),
    /// A comment with the same id is already in the store
    Duplicate,
    /// The reply was not kept because its parent's replies are not open
    ReplyDiscarded {
        parent: CommentId,
        count_updated: bool,
    },
    /// The reply's parent is not a loaded root comment
    Orphan(CommentId),
    Removed(Location),
    NotFound(CommentId),
    ReplyCountUpdated {
        id: CommentId,
        count: u32,
    },
}

impl CommentStore {
    /// Single entry point for all changes to the store
    ///
    /// Every mutation is idempotent, so it is fine to receive the same comment
    /// from a page fetch, from the feed and from the response to a local
    /// action, in any order.
    pub fn reconcile(&mut self, m: Mutation) -> Outcome {
        let outcome = match m {
            Mutation::Insert {
                comment,
                origin,
                parent_reply_count,
            } => self.apply_insert(comment, origin, parent_reply_count),
            Mutation::Remove(id) => self.apply_remove(id),
            Mutation::ReplyCount { id, count } => self.apply_reply_count_change(id, count),
        };
        tracing::trace!(?outcome, "reconciled comment mutation");
        outcome
    }

    pub fn apply_insert(
        &mut self,
        comment: Comment,
        origin: Origin,
        parent_reply_count: Option<u32>,
    ) -> Outcome {
        if self.contains(comment.id) {
            return Outcome::Duplicate;
        }
        let parent_id = comment.parent_id;
        let parent = match parent_id {
            None => {
                let index = match origin {
                    Origin::Page => {
                        self.roots.push(comment);
                        self.roots.len() - 1
                    }
                    Origin::Feed | Origin::Local => {
                        self.roots.insert(0, comment);
                        0
                    }
                };
                return Outcome::Inserted(Location::Root(index));
            }
            Some(parent) => parent,
        };
        if !self.is_root(parent) {
            return Outcome::Orphan(parent);
        }
        let count_updated = match parent_reply_count {
            Some(count) => {
                self.apply_reply_count_change(parent, count);
                true
            }
            None => false,
        };
        let set = match origin {
            Origin::Page => self.reply_set_mut(parent),
            Origin::Feed | Origin::Local => self.replies.get_mut(&parent).filter(|s| s.is_open),
        };
        match set {
            Some(set) => {
                set.loaded.push(comment);
                Outcome::Inserted(Location::Reply {
                    parent,
                    index: set.loaded.len() - 1,
                })
            }
            None => Outcome::ReplyDiscarded {
                parent,
                count_updated,
            },
        }
    }

    pub fn apply_remove(&mut self, id: CommentId) -> Outcome {
        let location = match self.locate(id) {
            Some(l) => l,
            None => return Outcome::NotFound(id),
        };
        match location {
            Location::Root(i) => {
                self.roots.remove(i);
                // Replies of a removed root can no longer be displayed
                self.replies.remove(&id);
            }
            Location::Reply { parent, index } => {
                if let Some(set) = self.replies.get_mut(&parent) {
                    set.loaded.remove(index);
                }
            }
        }
        Outcome::Removed(location)
    }

    pub fn apply_reply_count_change(&mut self, id: CommentId, count: u32) -> Outcome {
        match self.get_mut(id) {
            Some(c) => {
                c.reply_count = count;
                Outcome::ReplyCountUpdated { id, count }
            }
            None => Outcome::NotFound(id),
        }
    }
}
