use std::{
    collections::{BTreeMap, VecDeque},
    sync::Arc,
};

use async_trait::async_trait;
use colloquy_api::{
    Comment, CommentFeed, CommentId, CommentRpc, Error, FeedFrame, FeedMessage, FeedStream,
    NewComment, Page, PageToken, PostId, UserId, Uuid,
};
use futures::StreamExt;
use parking_lot::{Mutex, MutexGuard};
use tokio::sync::{mpsc, Semaphore};

/// In-memory comment service
///
/// Roots are listed newest first and replies oldest first, with page tokens
/// holding the id of the last comment returned, so that comments created
/// between two page fetches do not shift the following pages.
pub struct MockServer {
    posts: BTreeMap<PostId, MockPost>,
    next_id: i64,
    page_size: usize,
    echo: bool,
    failures: VecDeque<Error>,
    gate: Option<Arc<Semaphore>>,
    calls: Calls,
}

/// Number of requests received, per kind
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Calls {
    pub root_pages: usize,
    pub reply_pages: usize,
    pub sends: usize,
    pub deletes: usize,
    pub subscribes: usize,
    pub unsubscribes: usize,
}

#[derive(Debug, Default)]
struct MockPost {
    // ids are allocated in creation order
    comments: BTreeMap<CommentId, Comment>,
    feeds: Vec<mpsc::UnboundedSender<FeedFrame>>,
}

impl MockPost {
    fn relay_frame(&mut self, frame: FeedFrame) {
        self.feeds.retain(|f| f.send(frame.clone()).is_ok());
    }

    fn relay(&mut self, msg: FeedMessage) {
        self.relay_frame(msg.encode());
    }
}

fn parse_token(token: &PageToken) -> Result<i64, Error> {
    token
        .0
        .parse()
        .map_err(|_| Error::Unknown(format!("invalid page token {:?}", token.0)))
}

impl MockServer {
    pub fn new(page_size: usize) -> MockServer {
        MockServer {
            posts: BTreeMap::new(),
            next_id: 1,
            page_size,
            echo: true,
            failures: VecDeque::new(),
            gate: None,
            calls: Calls::default(),
        }
    }

    pub fn create_post(&mut self) -> PostId {
        let id = PostId(Uuid::new_v4());
        self.posts.insert(id, MockPost::default());
        id
    }

    /// Whether sends and deletes are broadcast on the post's feed, true by default
    pub fn set_echo(&mut self, echo: bool) {
        self.echo = echo;
    }

    /// Makes the next request fail with `err`
    pub fn fail_next(&mut self, err: Error) {
        self.failures.push_back(err);
    }

    /// Makes page requests wait for a permit of the returned semaphore
    pub fn hold_fetches(&mut self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        self.gate = Some(gate.clone());
        gate
    }

    /// Stops gating page requests; requests already waiting stay gated
    pub fn release_fetches(&mut self) {
        self.gate = None;
    }

    pub fn calls(&self) -> Calls {
        self.calls
    }

    /// Number of live subscriptions to the feed of `post`
    pub fn subscribers(&self, post: PostId) -> usize {
        self.posts
            .get(&post)
            .map(|p| p.feeds.iter().filter(|f| !f.is_closed()).count())
            .unwrap_or(0)
    }

    /// Creates a comment without broadcasting anything
    pub fn seed_comment(&mut self, post: PostId, parent: Option<CommentId>, body: &str) -> Comment {
        self.create(post, parent, String::from(body), false)
            .unwrap_or_else(|e| panic!("seeding comment on {post:?}: {e}"))
    }

    /// Creates `n` roots, returning them newest first like pages list them
    pub fn seed_roots(&mut self, post: PostId, n: usize) -> Vec<Comment> {
        let mut roots = (0..n)
            .map(|i| self.seed_comment(post, None, &format!("root {i}")))
            .collect::<Vec<_>>();
        roots.reverse();
        roots
    }

    pub fn get(&self, post: PostId, id: CommentId) -> Option<&Comment> {
        self.posts.get(&post)?.comments.get(&id)
    }

    pub fn push(&mut self, post: PostId, msg: FeedMessage) {
        self.push_frame(post, msg.encode());
    }

    pub fn push_frame(&mut self, post: PostId, frame: FeedFrame) {
        if let Some(p) = self.posts.get_mut(&post) {
            p.relay_frame(frame);
        }
    }

    fn create(
        &mut self,
        post: PostId,
        parent: Option<CommentId>,
        body: String,
        relay: bool,
    ) -> Result<Comment, Error> {
        let relay = relay && self.echo;
        let p = self.posts.get_mut(&post).ok_or(Error::PostNotFound(post))?;
        let parent_reply_count = match parent {
            None => None,
            Some(pid) => match p.comments.get_mut(&pid) {
                Some(c) if c.is_root() => {
                    c.reply_count += 1;
                    Some(c.reply_count)
                }
                _ => return Err(Error::CommentNotFound(pid)),
            },
        };
        let comment = Comment {
            id: CommentId(self.next_id),
            parent_id: parent,
            author_id: UserId::stub(),
            body,
            created_at: chrono::Utc::now(),
            deleted: false,
            reply_count: 0,
        };
        self.next_id += 1;
        p.comments.insert(comment.id, comment.clone());
        if relay {
            p.relay(FeedMessage::CommentCreated {
                comment: comment.clone(),
                parent_reply_count,
            });
            if let (Some(comment_id), Some(new_count)) = (parent, parent_reply_count) {
                p.relay(FeedMessage::CommentReplyCountChanged {
                    comment_id,
                    new_count,
                });
            }
        }
        tracing::debug!(?post, id = ?comment.id, "mock server created comment");
        Ok(comment)
    }

    fn delete(&mut self, id: CommentId) -> Result<(), Error> {
        let echo = self.echo;
        let p = self
            .posts
            .values_mut()
            .find(|p| p.comments.contains_key(&id))
            .ok_or(Error::CommentNotFound(id))?;
        let Some(comment) = p.comments.remove(&id) else {
            return Err(Error::CommentNotFound(id));
        };
        let parent_reply_count = match comment.parent_id {
            None => {
                p.comments.retain(|_, c| c.parent_id != Some(id));
                None
            }
            Some(parent) => p.comments.get_mut(&parent).map(|c| {
                c.reply_count = c.reply_count.saturating_sub(1);
                (parent, c.reply_count)
            }),
        };
        if echo {
            p.relay(FeedMessage::CommentDeleted {
                comment: comment.as_ref(),
            });
            if let Some((comment_id, new_count)) = parent_reply_count {
                p.relay(FeedMessage::CommentReplyCountChanged {
                    comment_id,
                    new_count,
                });
            }
        }
        Ok(())
    }

    fn page(
        &self,
        post: PostId,
        parent: Option<CommentId>,
        token: Option<PageToken>,
    ) -> Result<Page, Error> {
        let p = self.posts.get(&post).ok_or(Error::PostNotFound(post))?;
        let after = token.as_ref().map(parse_token).transpose()?;
        let candidates: Vec<&Comment> = match parent {
            None => p
                .comments
                .values()
                .rev()
                .filter(|c| c.is_root() && after.map(|a| c.id.0 < a).unwrap_or(true))
                .collect(),
            Some(pid) => {
                if !p.comments.get(&pid).map(|c| c.is_root()).unwrap_or(false) {
                    return Err(Error::CommentNotFound(pid));
                }
                p.comments
                    .values()
                    .filter(|c| c.parent_id == Some(pid) && after.map(|a| c.id.0 > a).unwrap_or(true))
                    .collect()
            }
        };
        let comments: Vec<Comment> = candidates
            .iter()
            .take(self.page_size)
            .map(|c| (*c).clone())
            .collect();
        let next_page_token = match comments.last() {
            Some(last) if candidates.len() > self.page_size => {
                Some(PageToken(last.id.0.to_string()))
            }
            _ => None,
        };
        Ok(Page {
            comments,
            next_page_token,
        })
    }
}

/// Handle implementing the transport traits over a shared `MockServer`
#[derive(Clone)]
pub struct SharedMock(Arc<Mutex<MockServer>>);

impl SharedMock {
    pub fn new(server: MockServer) -> SharedMock {
        SharedMock(Arc::new(Mutex::new(server)))
    }

    pub fn lock(&self) -> MutexGuard<'_, MockServer> {
        self.0.lock()
    }
}

#[async_trait]
impl CommentRpc for SharedMock {
    async fn get_comments(
        &self,
        post: PostId,
        parent: Option<CommentId>,
        page: Option<PageToken>,
    ) -> Result<Page, Error> {
        let gate = {
            let mut s = self.lock();
            match parent {
                None => s.calls.root_pages += 1,
                Some(_) => s.calls.reply_pages += 1,
            }
            s.gate.clone()
        };
        if let Some(gate) = gate {
            gate.acquire()
                .await
                .expect("mock server fetch gate was closed")
                .forget();
        }
        let mut s = self.lock();
        if let Some(err) = s.failures.pop_front() {
            return Err(err);
        }
        s.page(post, parent, page)
    }

    async fn send_comment(&self, comment: NewComment) -> Result<Comment, Error> {
        comment.validate()?;
        let mut s = self.lock();
        s.calls.sends += 1;
        if let Some(err) = s.failures.pop_front() {
            return Err(err);
        }
        s.create(comment.post_id, comment.parent_id, comment.text, true)
    }

    async fn delete_comment(&self, comment: CommentId) -> Result<(), Error> {
        let mut s = self.lock();
        s.calls.deletes += 1;
        if let Some(err) = s.failures.pop_front() {
            return Err(err);
        }
        s.delete(comment)
    }
}

#[async_trait]
impl CommentFeed for SharedMock {
    async fn subscribe(&self, post: PostId) -> Result<FeedStream, Error> {
        let mut s = self.lock();
        s.calls.subscribes += 1;
        let p = s.posts.get_mut(&post).ok_or(Error::PostNotFound(post))?;
        let (sender, receiver) = mpsc::unbounded_channel();
        p.feeds.push(sender);
        Ok(futures::stream::unfold(receiver, |mut r| async move {
            r.recv().await.map(|frame| (frame, r))
        })
        .boxed())
    }

    async fn unsubscribe(&self, post: PostId) {
        let mut s = self.lock();
        s.calls.unsubscribes += 1;
        if let Some(p) = s.posts.get_mut(&post) {
            p.feeds.clear();
        }
    }
}
