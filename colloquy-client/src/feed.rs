use futures::{channel::oneshot, select, FutureExt, StreamExt};

use crate::{
    api::{CommentFeed, Error as ApiError, FeedMessage, FeedStream, PostId},
    Mutation,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AdapterEnd {
    Cancelled,
    StreamClosed,
}

/// Relays the push events of one post to the reconciler
///
/// There is no reconnection nor backfill here: if the transport drops events,
/// they are lost until the thread is reopened.
pub struct EventAdapter {
    post: PostId,
    stream: FeedStream,
}

impl EventAdapter {
    pub async fn subscribe(feed: &dyn CommentFeed, post: PostId) -> Result<EventAdapter, ApiError> {
        let stream = feed.subscribe(post).await?;
        tracing::info!(?post, "subscribed to comment feed");
        Ok(EventAdapter { post, stream })
    }

    /// Runs until `cancel` fires (or is dropped) or the stream ends
    pub async fn run<F>(self, cancel: oneshot::Receiver<()>, mut apply: F) -> AdapterEnd
    where
        F: FnMut(Mutation),
    {
        let post = self.post;
        let mut stream = self.stream.fuse();
        let mut cancel = cancel.fuse();
        loop {
            select! {
                _ = cancel => {
                    tracing::info!(?post, "stopped listening to comment feed");
                    return AdapterEnd::Cancelled;
                }
                frame = stream.next() => match frame {
                    None => {
                        tracing::info!(?post, "comment feed closed");
                        return AdapterEnd::StreamClosed;
                    }
                    Some(frame) => match FeedMessage::decode(&frame) {
                        Ok(msg) => apply(Mutation::from(msg)),
                        Err(err) => {
                            tracing::warn!(?post, ?err, ?frame, "ignoring undecodable feed frame");
                        }
                    },
                },
            }
        }
    }
}
