use anyhow::Context;

use crate::{Comment, CommentId, CommentRef};

/// One raw frame as delivered by the push transport
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FeedFrame {
    Text(String),
    Binary(Vec<u8>),
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum FeedMessage {
    CommentCreated {
        comment: Comment,

        /// New reply count of the parent, when the server knows it
        #[serde(default)]
        parent_reply_count: Option<u32>,
    },
    CommentDeleted {
        comment: CommentRef,
    },
    CommentReplyCountChanged {
        comment_id: CommentId,
        new_count: u32,
    },
}

impl FeedMessage {
    pub fn decode(frame: &FeedFrame) -> anyhow::Result<FeedMessage> {
        match frame {
            FeedFrame::Text(t) => serde_json::from_str(t).context("decoding text feed frame"),
            FeedFrame::Binary(b) => {
                serde_json::from_slice(b).context("decoding binary feed frame")
            }
        }
    }

    pub fn encode(&self) -> FeedFrame {
        FeedFrame::Text(serde_json::to_string(self).expect("serializing feed message"))
    }
}
