use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::{Comment, CommentId, Error, FeedFrame, NewComment, Page, PageToken, PostId};

pub type FeedStream = BoxStream<'static, FeedFrame>;

/// Request/response side of the comment service
#[async_trait]
pub trait CommentRpc: Send + Sync {
    /// Lists one page of the root comments of `post` (if `parent` is None) or
    /// of the replies to `parent`
    async fn get_comments(
        &self,
        post: PostId,
        parent: Option<CommentId>,
        page: Option<PageToken>,
    ) -> Result<Page, Error>;

    async fn send_comment(&self, comment: NewComment) -> Result<Comment, Error>;

    async fn delete_comment(&self, comment: CommentId) -> Result<(), Error>;
}

/// Push side of the comment service, one channel per post
#[async_trait]
pub trait CommentFeed: Send + Sync {
    async fn subscribe(&self, post: PostId) -> Result<FeedStream, Error>;

    async fn unsubscribe(&self, post: PostId);
}
