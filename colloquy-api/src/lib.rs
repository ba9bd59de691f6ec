use chrono::Utc;

pub use uuid::{uuid, Uuid};
pub type Time = chrono::DateTime<Utc>;

pub const STUB_UUID: Uuid = uuid!("ffffffff-ffff-ffff-ffff-ffffffffffff");

mod comment;
pub use comment::{Comment, CommentId, CommentRef, NewComment, PostId};

mod error;
pub use error::Error;

mod feed;
pub use feed::{FeedFrame, FeedMessage};

mod page;
pub use page::{Page, PageToken};

mod transport;
pub use transport::{CommentFeed, CommentRpc, FeedStream};

mod user;
pub use user::UserId;

// Validation functions are here to make sure that the data is fine before it
// leaves the client, so that we get a nice error message instead of an opaque
// server-side failure.
pub fn validate_string(s: &str) -> Result<(), Error> {
    if s.contains('\0') {
        return Err(Error::NullByteInString(String::from(s)));
    }
    Ok(())
}
