use std::sync::Arc;

use anyhow::Context;
use futures::channel::oneshot;
use parking_lot::Mutex;
use tokio::{runtime::Handle, task::JoinHandle};

use crate::{
    api::{
        Comment, CommentFeed, CommentId, CommentRpc, Error as ApiError, NewComment, PostId,
    },
    deep_link::PendingDeepLink,
    AdapterEnd, CommentStore, Cursor, ElementLookup, Error, EventAdapter, FetchOutcome, Location,
    Mutation, Origin, Outcome, PageRequest, Paginator, ReplySet, ScrollSource, Target,
    ThreadConfig, Virtualizer,
};

/// Everything a thread needs from its host
pub struct ThreadContext {
    pub post: PostId,
    pub rpc: Arc<dyn CommentRpc>,
    pub feed: Arc<dyn CommentFeed>,
    pub config: ThreadConfig,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct Flash {
    pub id: CommentId,
    pub generation: u64,
}

pub(crate) struct ThreadState {
    pub store: CommentStore,
    pub paginator: Paginator,
    pub virtualizer: Virtualizer,
    pub scroll: Box<dyn ScrollSource>,
    pub flash: Option<Flash>,
    pub flash_generation: u64,
    pub pending_deep_link: Option<PendingDeepLink>,
    pub disposed: bool,
}

impl ThreadState {
    /// Applies a mutation to the store, dropping the measured height of
    /// removed rows
    pub fn apply(&mut self, m: Mutation) -> Outcome {
        let removed = match &m {
            Mutation::Remove(id) => Some(*id),
            _ => None,
        };
        let outcome = self.store.reconcile(m);
        if let (Some(id), Outcome::Removed(Location::Root(_))) = (removed, &outcome) {
            self.virtualizer.forget(id);
        }
        outcome
    }

    fn begin_fetch(&mut self, target: Target) -> Result<Result<PageRequest, FetchOutcome>, Error> {
        if self.disposed {
            return Err(Error::Disposed);
        }
        Ok(self.paginator.begin(&self.store, target))
    }

    fn flashing(&self) -> Option<CommentId> {
        self.flash.map(|f| f.id)
    }

    fn reply_view(&self, parent: CommentId) -> Option<ReplyView> {
        let set = self.store.replies(parent).filter(|s| s.is_open)?;
        let target = Target::Replies(parent);
        Some(ReplyView {
            loaded: set.loaded.clone(),
            has_more: set.cursor.has_more(),
            is_loading: self.paginator.is_loading(target),
            last_error: self.paginator.last_error(target).cloned(),
            draft_text: set.draft_text.clone(),
            flashing: self
                .flashing()
                .filter(|id| set.loaded.iter().any(|c| c.id == *id)),
        })
    }

    /// Computes the mounted rows, and whether the next root page should be
    /// fetched
    fn rows(&self) -> (Rows, bool) {
        let roots = self.store.root_comments();
        let layout = self.virtualizer.layout(roots, &*self.scroll);
        let flashing = self.flashing();
        let rows = layout
            .rows
            .iter()
            .map(|r| VisibleRow {
                index: r.index,
                comment: roots[r.index].clone(),
                top: r.top,
                height: r.height,
                measured: r.measured,
                flashing: flashing == Some(r.id),
                replies: self.reply_view(r.id),
            })
            .collect();
        let has_more = self.paginator.has_more(&self.store, Target::Root);
        let is_loading = self.paginator.is_loading(Target::Root);
        let wants_more = layout.near_end && has_more && !is_loading && !self.disposed;
        let rows = Rows {
            rows,
            offset: layout.offset,
            total_height: layout.total_height,
            scroll_offset: self.scroll.scroll_offset(),
            has_more,
            is_loading,
        };
        (rows, wants_more)
    }
}

/// The replies to render under an open root comment
#[derive(Clone, Debug, PartialEq)]
pub struct ReplyView {
    pub loaded: Vec<Comment>,
    pub has_more: bool,
    pub is_loading: bool,
    pub last_error: Option<ApiError>,
    pub draft_text: String,
    pub flashing: Option<CommentId>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct VisibleRow {
    pub index: usize,
    pub comment: Comment,
    pub top: f64,
    pub height: f64,
    pub measured: bool,
    pub flashing: bool,
    /// Set only when the replies are open
    pub replies: Option<ReplyView>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Rows {
    pub rows: Vec<VisibleRow>,
    /// Translation to apply to all the rows
    pub offset: f64,
    pub total_height: f64,
    /// Scroll position the host should be at, relative to the list's top
    pub scroll_offset: f64,
    pub has_more: bool,
    pub is_loading: bool,
}

struct FeedHandle {
    cancel: oneshot::Sender<()>,
    task: JoinHandle<AdapterEnd>,
}

/// Clears the in-flight flag of a fetch whose future was dropped mid-request
struct InFlight<'a> {
    state: &'a Mutex<ThreadState>,
    target: Target,
    armed: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.armed {
            tracing::debug!(target = ?self.target, "page fetch abandoned");
            self.state.lock().paginator.finish(self.target);
        }
    }
}

/// One post's comment thread, from the time its panel is mounted to the time
/// it is unmounted
///
/// This is a handle: clones share the same thread. All the methods are safe to
/// call concurrently from multiple tasks.
#[derive(Clone)]
pub struct Thread {
    pub(crate) ctx: Arc<ThreadContext>,
    pub(crate) state: Arc<Mutex<ThreadState>>,
    /// Locked on its own, so that hosts can call back into the thread from
    /// `ElementLookup::reveal`
    pub(crate) elements: Arc<Mutex<Box<dyn ElementLookup>>>,
    feed: Arc<Mutex<Option<FeedHandle>>>,
}

impl Thread {
    /// Subscribes to the post's comment feed
    ///
    /// No page is fetched, call `fetch_root_page` to load the first one. Must be
    /// called from within a tokio runtime.
    pub async fn open(
        ctx: ThreadContext,
        scroll: Box<dyn ScrollSource>,
        elements: Box<dyn ElementLookup>,
    ) -> Result<Thread, Error> {
        let post = ctx.post;
        let adapter = EventAdapter::subscribe(&*ctx.feed, post)
            .await
            .with_context(|| format!("subscribing to the comment feed of post {post:?}"))?;
        let state = Arc::new(Mutex::new(ThreadState {
            store: CommentStore::new(),
            paginator: Paginator::new(),
            virtualizer: Virtualizer::new(&ctx.config),
            scroll,
            flash: None,
            flash_generation: 0,
            pending_deep_link: None,
            disposed: false,
        }));
        let (cancel, cancelled) = oneshot::channel();
        let task = tokio::spawn({
            let state = state.clone();
            adapter.run(cancelled, move |m| {
                let mut state = state.lock();
                if state.disposed {
                    return;
                }
                let outcome = state.apply(m);
                tracing::trace!(?outcome, "applied feed event");
            })
        });
        tracing::debug!(?post, "opened comment thread");
        Ok(Thread {
            ctx: Arc::new(ctx),
            state,
            elements: Arc::new(Mutex::new(elements)),
            feed: Arc::new(Mutex::new(Some(FeedHandle { cancel, task }))),
        })
    }

    /// Stops listening to the feed and unsubscribes
    ///
    /// Results of requests still running are discarded when they arrive.
    /// Disposing twice is a no-op.
    pub async fn dispose(&self) {
        self.state.lock().disposed = true;
        let handle = self.feed.lock().take();
        let Some(FeedHandle { cancel, task }) = handle else {
            return;
        };
        // Err means the adapter already stopped on its own
        let _ = cancel.send(());
        match task.await {
            Ok(end) => tracing::debug!(?end, "comment feed adapter stopped"),
            Err(err) => tracing::warn!(?err, "comment feed adapter did not stop cleanly"),
        }
        self.ctx.feed.unsubscribe(self.ctx.post).await;
        tracing::info!(post = ?self.ctx.post, "unsubscribed from comment feed");
    }

    pub fn is_disposed(&self) -> bool {
        self.state.lock().disposed
    }

    pub fn post(&self) -> PostId {
        self.ctx.post
    }

    pub fn config(&self) -> &ThreadConfig {
        &self.ctx.config
    }

    pub async fn fetch_root_page(&self) -> Result<FetchOutcome, Error> {
        self.fetch_page(Target::Root).await
    }

    pub async fn fetch_reply_page(&self, parent: CommentId) -> Result<FetchOutcome, Error> {
        self.fetch_page(Target::Replies(parent)).await
    }

    /// Fetches the next page of `target`
    ///
    /// Transport errors are returned and leave the store untouched.
    pub async fn fetch_page(&self, target: Target) -> Result<FetchOutcome, Error> {
        let req = match self.state.lock().begin_fetch(target)? {
            Ok(req) => req,
            Err(outcome) => {
                tracing::trace!(?target, ?outcome, "no page request sent");
                return Ok(outcome);
            }
        };
        self.run_fetch(req).await
    }

    /// Sends a request for which `Paginator::begin` was already called
    async fn run_fetch(&self, req: PageRequest) -> Result<FetchOutcome, Error> {
        let target = req.target;
        let mut guard = InFlight {
            state: &self.state,
            target,
            armed: true,
        };
        let res = self
            .ctx
            .rpc
            .get_comments(self.ctx.post, target.parent(), req.token)
            .await;
        guard.armed = false;

        let mut state = self.state.lock();
        if state.disposed {
            state.paginator.finish(target);
            tracing::debug!(?target, "discarding page of a disposed thread");
            return Ok(FetchOutcome::Discarded);
        }
        match res {
            Ok(page) => {
                let ThreadState {
                    store, paginator, ..
                } = &mut *state;
                Ok(paginator.complete(store, target, page))
            }
            Err(err) => {
                state.paginator.fail(target, err.clone());
                Err(Error::Api(err))
            }
        }
    }

    fn spawn_fetch(&self, runtime: &Handle, req: PageRequest) {
        let this = self.clone();
        runtime.spawn(async move {
            match this.run_fetch(req).await {
                Ok(outcome) => tracing::trace!(?outcome, "automatic page fetch done"),
                Err(err) => tracing::warn!(?err, "automatic page fetch failed"),
            }
        });
    }

    /// Lays out the rows, starting the next root page fetch if the end of the
    /// list is in sight
    ///
    /// Outside of a tokio runtime, there is nothing to run the fetch on, so
    /// the rows are laid out without it.
    fn refresh(&self, state: &mut ThreadState) -> Rows {
        let (rows, wants_more) = state.rows();
        if wants_more {
            match Handle::try_current() {
                Ok(runtime) => {
                    if let Ok(req) = state.paginator.begin(&state.store, Target::Root) {
                        self.spawn_fetch(&runtime, req);
                    }
                }
                Err(_) => {
                    tracing::debug!("no tokio runtime, not fetching the next page automatically");
                }
            }
        }
        rows
    }

    /// Fetches the next root page in the background when the end of the list
    /// is in sight, if called from within a tokio runtime
    pub fn visible_rows(&self) -> Rows {
        self.refresh(&mut self.state.lock())
    }

    /// `raw` is the host's scroll position, as understood by its `ScrollSource`
    ///
    /// Like `visible_rows`, this may start a background fetch when called from
    /// within a tokio runtime.
    pub fn on_scroll(&self, raw: f64) -> Rows {
        let mut state = self.state.lock();
        state.scroll.set_scroll(raw);
        self.refresh(&mut state)
    }

    /// Same as `on_scroll`, for viewport size changes
    pub fn on_resize(&self, viewport: f64) -> Rows {
        let mut state = self.state.lock();
        state.scroll.set_viewport(viewport);
        self.refresh(&mut state)
    }

    /// Records the rendered height of a row, returns true if the layout changed
    pub fn measure_row(&self, id: CommentId, height: f64) -> bool {
        self.state.lock().virtualizer.measure(id, height)
    }

    /// Opens the replies of `parent` if they were closed, and vice versa
    ///
    /// Returns whether the replies are now open. The first page of replies is
    /// fetched on the first opening.
    pub async fn toggle_replies(&self, parent: CommentId) -> Result<bool, Error> {
        let open = !self.state.lock().store.is_reply_open(parent);
        self.set_replies_open(parent, open).await?;
        Ok(open)
    }

    pub async fn set_replies_open(&self, parent: CommentId, open: bool) -> Result<(), Error> {
        let never_loaded = {
            let mut state = self.state.lock();
            if state.disposed {
                return Err(Error::Disposed);
            }
            if !state.store.set_reply_open(parent, open) {
                return Err(Error::NotARoot(parent));
            }
            open && state
                .store
                .replies(parent)
                .map(|s| s.cursor == Cursor::Start)
                .unwrap_or(false)
        };
        if never_loaded {
            self.fetch_reply_page(parent).await?;
        }
        Ok(())
    }

    /// Sends a new comment, or a reply if `parent` is set
    ///
    /// The comment is shown right away, without waiting for the feed to echo it
    /// back. The matching draft is cleared on success.
    pub async fn submit_comment(
        &self,
        text: String,
        parent: Option<CommentId>,
    ) -> Result<Comment, Error> {
        let new = NewComment::new(self.ctx.post, parent, text);
        new.validate()?;
        if self.is_disposed() {
            return Err(Error::Disposed);
        }
        let comment = self.ctx.rpc.send_comment(new).await?;
        let mut state = self.state.lock();
        if !state.disposed {
            let outcome = state.apply(Mutation::insert(comment.clone(), Origin::Local));
            tracing::debug!(id = ?comment.id, ?outcome, "comment sent");
            state.store.set_draft(parent, String::new());
        }
        Ok(comment)
    }

    pub async fn delete_comment(&self, id: CommentId) -> Result<(), Error> {
        if self.is_disposed() {
            return Err(Error::Disposed);
        }
        self.ctx.rpc.delete_comment(id).await?;
        let mut state = self.state.lock();
        if !state.disposed {
            let outcome = state.apply(Mutation::Remove(id));
            tracing::debug!(?id, ?outcome, "comment deleted");
        }
        Ok(())
    }

    /// Applies a mutation the host received through some other channel
    pub fn reconcile(&self, m: Mutation) -> Outcome {
        self.state.lock().apply(m)
    }

    /// Returns false if `parent` is set but is not a loaded root comment
    pub fn set_draft(&self, parent: Option<CommentId>, text: String) -> bool {
        self.state.lock().store.set_draft(parent, text)
    }

    pub fn draft(&self, parent: Option<CommentId>) -> String {
        String::from(self.state.lock().store.draft(parent))
    }

    pub fn has_more(&self, target: Target) -> bool {
        let state = self.state.lock();
        state.paginator.has_more(&state.store, target)
    }

    pub fn is_loading(&self, target: Target) -> bool {
        self.state.lock().paginator.is_loading(target)
    }

    pub fn last_error(&self, target: Target) -> Option<ApiError> {
        self.state.lock().paginator.last_error(target).cloned()
    }

    pub fn root_comments(&self) -> Vec<Comment> {
        self.state.lock().store.root_comments().to_vec()
    }

    pub fn replies(&self, parent: CommentId) -> Option<ReplySet> {
        self.state.lock().store.replies(parent).cloned()
    }

    pub fn get(&self, id: CommentId) -> Option<Comment> {
        self.state.lock().store.get(id).cloned()
    }

    /// The comment currently highlighted after a deep link, if any
    pub fn flashing(&self) -> Option<CommentId> {
        self.state.lock().flashing()
    }
}
