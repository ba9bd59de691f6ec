use std::fmt;

use uuid::Uuid;

use crate::{Error, Time, UserId, STUB_UUID};

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct PostId(pub Uuid);

impl PostId {
    pub fn stub() -> PostId {
        PostId(STUB_UUID)
    }
}

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct CommentId(pub i64);

impl fmt::Display for CommentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Comment {
    pub id: CommentId,

    /// None for root comments, the server also sends 0 for those
    #[serde(default, deserialize_with = "deserialize_parent_id")]
    pub parent_id: Option<CommentId>,

    pub author_id: UserId,
    pub body: String,
    pub created_at: Time,

    /// Tombstone flag, for deleted comments the server still lists
    #[serde(default)]
    pub deleted: bool,

    /// Total number of replies, as counted by the server
    ///
    /// This is NOT the number of replies loaded locally, which is usually
    /// only a prefix of the full list.
    #[serde(default)]
    pub reply_count: u32,
}

impl Comment {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn as_ref(&self) -> CommentRef {
        CommentRef {
            id: self.id,
            parent_id: self.parent_id,
        }
    }
}

/// The subset of a comment that identifies its position in a thread
#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct CommentRef {
    pub id: CommentId,

    #[serde(default, deserialize_with = "deserialize_parent_id")]
    pub parent_id: Option<CommentId>,
}

fn deserialize_parent_id<'de, D>(d: D) -> Result<Option<CommentId>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let parent = <Option<CommentId> as serde::Deserialize>::deserialize(d)?;
    Ok(parent.filter(|p| p.0 != 0))
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct NewComment {
    pub post_id: PostId,
    pub parent_id: Option<CommentId>,
    pub text: String,
}

impl NewComment {
    pub fn new(post_id: PostId, parent_id: Option<CommentId>, text: String) -> NewComment {
        NewComment {
            post_id,
            parent_id,
            text,
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.text.trim().is_empty() {
            return Err(Error::EmptyComment);
        }
        crate::validate_string(&self.text)
    }
}
