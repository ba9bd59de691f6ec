use std::collections::{HashMap, HashSet};

use crate::{
    api::{CommentId, Error as ApiError, Page, PageToken},
    CommentStore, Cursor, Mutation, Origin, Outcome,
};

/// A list of comments that can be paginated
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Target {
    Root,
    Replies(CommentId),
}

impl Target {
    pub fn parent(&self) -> Option<CommentId> {
        match self {
            Target::Root => None,
            Target::Replies(p) => Some(*p),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PageRequest {
    pub target: Target,
    pub token: Option<PageToken>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FetchOutcome {
    Loaded { inserted: usize, has_more: bool },
    /// A fetch for the same target is already running, no request was sent
    AlreadyInFlight,
    /// The last page was already fetched, no request was sent
    Exhausted,
    /// The parent of the replies is no longer in the thread
    Orphaned,
    /// The thread was disposed while the request was running
    Discarded,
}

/// Tracks which pages are being fetched
///
/// Cursors live in the store alongside the comments they paginate; this only
/// keeps the in-flight flags that keep the same page from being requested twice,
/// and the last error of each target.
#[derive(Debug, Default)]
pub struct Paginator {
    in_flight: HashSet<Target>,
    last_errors: HashMap<Target, ApiError>,
}

impl Paginator {
    pub fn new() -> Paginator {
        Paginator::default()
    }

    fn cursor<'a>(store: &'a CommentStore, target: Target) -> Option<&'a Cursor> {
        static NOT_STARTED: Cursor = Cursor::Start;
        match target {
            Target::Root => Some(store.root_cursor()),
            Target::Replies(parent) => match store.replies(parent) {
                Some(set) => Some(&set.cursor),
                None if store.is_root(parent) => Some(&NOT_STARTED),
                None => None,
            },
        }
    }

    pub fn has_more(&self, store: &CommentStore, target: Target) -> bool {
        Self::cursor(store, target)
            .map(|c| c.has_more())
            .unwrap_or(false)
    }

    pub fn is_loading(&self, target: Target) -> bool {
        self.in_flight.contains(&target)
    }

    pub fn last_error(&self, target: Target) -> Option<&ApiError> {
        self.last_errors.get(&target)
    }

    /// Marks `target` as being fetched, returning the request to send
    ///
    /// Err is returned when no request must be sent.
    pub fn begin(
        &mut self,
        store: &CommentStore,
        target: Target,
    ) -> Result<PageRequest, FetchOutcome> {
        if self.in_flight.contains(&target) {
            return Err(FetchOutcome::AlreadyInFlight);
        }
        let cursor = Self::cursor(store, target).ok_or(FetchOutcome::Orphaned)?;
        if !cursor.has_more() {
            return Err(FetchOutcome::Exhausted);
        }
        let token = cursor.token();
        self.in_flight.insert(target);
        tracing::debug!(?target, ?token, "starting page fetch");
        Ok(PageRequest { target, token })
    }

    /// Clears the in-flight flag, without touching the store
    pub fn finish(&mut self, target: Target) {
        self.in_flight.remove(&target);
    }

    /// Hands a fetched page over to the store, in server order
    pub fn complete(
        &mut self,
        store: &mut CommentStore,
        target: Target,
        page: Page,
    ) -> FetchOutcome {
        self.finish(target);
        self.last_errors.remove(&target);
        let cursor = match target {
            Target::Root => &mut store.root_cursor,
            Target::Replies(parent) => match store.reply_set_mut(parent) {
                Some(set) => &mut set.cursor,
                None => {
                    tracing::debug!(?parent, "dropping reply page of a removed comment");
                    return FetchOutcome::Orphaned;
                }
            },
        };
        cursor.advance(page.next_page_token);
        let has_more = cursor.has_more();
        let mut inserted = 0;
        for c in page.comments {
            if c.parent_id != target.parent() {
                tracing::warn!(
                    ?target,
                    comment = ?c.id,
                    parent = ?c.parent_id,
                    "page returned a comment with an unexpected parent"
                );
            }
            if let Outcome::Inserted(_) = store.reconcile(Mutation::insert(c, Origin::Page)) {
                inserted += 1;
            }
        }
        tracing::debug!(?target, inserted, has_more, "page fetch complete");
        FetchOutcome::Loaded { inserted, has_more }
    }

    /// Records a failed fetch; the cursor is left as is so the fetch can be retried
    pub fn fail(&mut self, target: Target, err: ApiError) {
        self.finish(target);
        tracing::debug!(?target, ?err, "page fetch failed");
        self.last_errors.insert(target, err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::{comment, store_with_roots};

    fn token(s: &str) -> Option<PageToken> {
        Some(PageToken(String::from(s)))
    }

    #[test]
    fn second_fetch_is_rejected_while_first_runs() {
        let store = CommentStore::new();
        let mut p = Paginator::new();
        let req = p.begin(&store, Target::Root).unwrap();
        assert_eq!(req.token, None);
        assert!(p.is_loading(Target::Root));
        assert_eq!(
            p.begin(&store, Target::Root),
            Err(FetchOutcome::AlreadyInFlight),
        );
        p.finish(Target::Root);
        assert!(p.begin(&store, Target::Root).is_ok());
    }

    #[test]
    fn targets_are_guarded_independently() {
        let store = store_with_roots(&[1, 2]);
        let mut p = Paginator::new();
        p.begin(&store, Target::Replies(CommentId(1))).unwrap();
        assert!(p.begin(&store, Target::Replies(CommentId(2))).is_ok());
        assert!(p.begin(&store, Target::Root).is_ok());
        assert_eq!(
            p.begin(&store, Target::Replies(CommentId(3))),
            Err(FetchOutcome::Orphaned),
        );
    }

    #[test]
    fn pages_follow_the_cursor_until_exhausted() {
        let mut store = CommentStore::new();
        let mut p = Paginator::new();

        p.begin(&store, Target::Root).unwrap();
        let page = Page {
            comments: vec![comment(3, None), comment(2, None)],
            next_page_token: token("p2"),
        };
        assert_eq!(
            p.complete(&mut store, Target::Root, page),
            FetchOutcome::Loaded {
                inserted: 2,
                has_more: true,
            },
        );
        assert!(!p.is_loading(Target::Root));

        let req = p.begin(&store, Target::Root).unwrap();
        assert_eq!(req.token, token("p2"));
        // The page overlaps with what we already have, eg. after a live insert
        let page = Page::last(vec![comment(2, None), comment(1, None)]);
        assert_eq!(
            p.complete(&mut store, Target::Root, page),
            FetchOutcome::Loaded {
                inserted: 1,
                has_more: false,
            },
        );
        let ids = store.root_comments().iter().map(|c| c.id.0).collect::<Vec<_>>();
        assert_eq!(ids, vec![3, 2, 1]);
        assert_eq!(p.begin(&store, Target::Root), Err(FetchOutcome::Exhausted));
        assert!(!p.has_more(&store, Target::Root));
    }

    #[test]
    fn failure_keeps_cursor_and_store() {
        let mut store = CommentStore::new();
        let mut p = Paginator::new();
        p.begin(&store, Target::Root).unwrap();
        p.complete(
            &mut store,
            Target::Root,
            Page {
                comments: vec![comment(1, None)],
                next_page_token: token("p2"),
            },
        );
        p.begin(&store, Target::Root).unwrap();
        p.fail(Target::Root, ApiError::Network(String::from("timeout")));
        assert_eq!(
            p.last_error(Target::Root),
            Some(&ApiError::Network(String::from("timeout"))),
        );
        assert_eq!(store.len(), 1);
        let req = p.begin(&store, Target::Root).unwrap();
        assert_eq!(req.token, token("p2"));
        p.complete(&mut store, Target::Root, Page::last(vec![]));
        assert_eq!(p.last_error(Target::Root), None);
    }

    #[test]
    fn reply_pages_land_in_the_reply_set() {
        let mut store = store_with_roots(&[1]);
        let mut p = Paginator::new();
        let target = Target::Replies(CommentId(1));
        assert!(p.has_more(&store, target));
        p.begin(&store, target).unwrap();
        p.complete(
            &mut store,
            target,
            Page {
                comments: vec![comment(10, Some(1))],
                next_page_token: token("r2"),
            },
        );
        let set = store.replies(CommentId(1)).unwrap();
        assert_eq!(set.loaded.len(), 1);
        assert_eq!(set.cursor, Cursor::Next(PageToken(String::from("r2"))));
        assert!(!set.is_open);
    }

    #[test]
    fn reply_page_for_removed_parent_is_dropped() {
        let mut store = store_with_roots(&[1]);
        let mut p = Paginator::new();
        let target = Target::Replies(CommentId(1));
        p.begin(&store, target).unwrap();
        store.reconcile(Mutation::Remove(CommentId(1)));
        assert_eq!(
            p.complete(&mut store, target, Page::last(vec![comment(10, Some(1))])),
            FetchOutcome::Orphaned,
        );
        assert!(store.is_empty());
        assert!(!p.is_loading(target));
    }
}
