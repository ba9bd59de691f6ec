use crate::{
    api::CommentId,
    thread::{Flash, ThreadState},
    Align, FetchOutcome, Location, Thread,
};

/// Access to the host's rendered elements
///
/// Replies are not virtualized, so once their parent is open the host can
/// bring them into view directly.
pub trait ElementLookup: Send {
    /// Scrolls the element of comment `id` into view, returns false if the
    /// element is not rendered
    fn reveal(&mut self, id: CommentId) -> bool;
}

/// For hosts that render nothing, eg. tests
#[derive(Clone, Copy, Debug, Default)]
pub struct NoElements;

impl ElementLookup for NoElements {
    fn reveal(&mut self, _id: CommentId) -> bool {
        false
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Resolution {
    Root { index: usize },
    Reply { parent: CommentId, revealed: bool },
    NotFound,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct PendingDeepLink {
    pub id: CommentId,
    pub resolving: bool,
}

impl ThreadState {
    fn clear_pending_deep_link(&mut self, id: CommentId) {
        if self.pending_deep_link.map(|l| l.id) == Some(id) {
            self.pending_deep_link = None;
        }
    }

    fn scroll_to_root(&mut self, index: usize, align: Align) {
        let viewport = self.scroll.viewport_size();
        let offset =
            self.virtualizer
                .scroll_offset_for(self.store.root_comments(), index, align, viewport);
        self.scroll.scroll_to(offset);
    }
}

impl Thread {
    /// Remembers a comment to scroll to once `resolve_pending_deep_link` is called
    pub fn set_pending_deep_link(&self, id: CommentId) {
        self.state.lock().pending_deep_link = Some(PendingDeepLink {
            id,
            resolving: false,
        });
    }

    pub fn pending_deep_link(&self) -> Option<CommentId> {
        self.state.lock().pending_deep_link.map(|l| l.id)
    }

    /// Resolves the pending deep link, if any and if it is not already being
    /// resolved
    pub async fn resolve_pending_deep_link(&self) -> Option<Resolution> {
        let id = {
            let mut state = self.state.lock();
            match &mut state.pending_deep_link {
                Some(link) if !link.resolving => {
                    link.resolving = true;
                    link.id
                }
                _ => return None,
            }
        };
        Some(self.resolve_deep_link(id).await)
    }

    /// Loads root pages until comment `id` is found, then scrolls to it and
    /// flashes it
    ///
    /// Running out of pages is not an error. The pending deep link for `id` is
    /// cleared whatever the result.
    pub async fn resolve_deep_link(&self, id: CommentId) -> Resolution {
        let resolution = match self.find(id).await {
            None => Resolution::NotFound,
            Some(Location::Root(_)) => self.reveal_root(id),
            Some(Location::Reply { parent, .. }) => self.reveal_reply(parent, id).await,
        };
        tracing::debug!(?id, ?resolution, "deep link resolved");
        self.state.lock().clear_pending_deep_link(id);
        resolution
    }

    async fn find(&self, id: CommentId) -> Option<Location> {
        loop {
            if let Some(location) = self.state.lock().store.probe(id) {
                return Some(location);
            }
            match self.fetch_root_page().await {
                Ok(FetchOutcome::Loaded { inserted, has_more }) => {
                    tracing::debug!(?id, inserted, has_more, "looking for deep-linked comment");
                }
                Ok(FetchOutcome::AlreadyInFlight) => {
                    tokio::time::sleep(self.ctx.config.fetch_retry_delay()).await;
                }
                Ok(outcome) => {
                    tracing::debug!(?id, ?outcome, "deep-linked comment not found");
                    // The last page may have been inserted by a concurrent fetch
                    return self.state.lock().store.probe(id);
                }
                Err(err) => {
                    tracing::debug!(?id, ?err, "giving up on deep link");
                    return None;
                }
            }
        }
    }

    fn reveal_root(&self, id: CommentId) -> Resolution {
        let mut state = self.state.lock();
        let Some(index) = state.store.root_index(id) else {
            return Resolution::NotFound;
        };
        state.scroll_to_root(index, Align::Center);
        drop(state);
        self.flash(id);
        Resolution::Root { index }
    }

    async fn reveal_reply(&self, parent: CommentId, id: CommentId) -> Resolution {
        {
            let mut state = self.state.lock();
            let Some(index) = state.store.root_index(parent) else {
                return Resolution::NotFound;
            };
            state.scroll_to_root(index, Align::Start);
        }
        if let Err(err) = self.set_replies_open(parent, true).await {
            tracing::debug!(?parent, ?err, "could not load the replies of deep-linked comment");
        }
        tokio::time::sleep(self.ctx.config.settle_delay()).await;

        let located = self.state.lock().store.locate(id);
        if !matches!(located, Some(Location::Reply { .. })) {
            return Resolution::NotFound;
        }
        let revealed = self.elements.lock().reveal(id);
        if !revealed {
            tracing::debug!(?id, "host did not reveal deep-linked reply");
        }
        self.flash(id);
        Resolution::Reply { parent, revealed }
    }

    /// Highlights `id` for the configured duration
    ///
    /// A later flash replaces this one; its timer then leaves the new one alone.
    pub fn flash(&self, id: CommentId) {
        let generation = {
            let mut state = self.state.lock();
            state.flash_generation += 1;
            let generation = state.flash_generation;
            state.flash = Some(Flash { id, generation });
            generation
        };
        let state = self.state.clone();
        let duration = self.ctx.config.flash_duration();
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let mut state = state.lock();
            if state.flash.map(|f| f.generation) == Some(generation) {
                state.flash = None;
            }
        });
    }
}
