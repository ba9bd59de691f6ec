mod config;
pub use config::ThreadConfig;

mod deep_link;
pub use deep_link::{ElementLookup, NoElements, Resolution};

mod error;
pub use error::Error;

mod feed;
pub use feed::{AdapterEnd, EventAdapter};

mod paginate;
pub use paginate::{FetchOutcome, PageRequest, Paginator, Target};

mod reconcile;
pub use reconcile::{Mutation, Origin, Outcome};

mod store;
pub use store::{CommentStore, Cursor, Location, ReplySet};

mod thread;
pub use thread::{ReplyView, Rows, Thread, ThreadContext, VisibleRow};

mod virtualize;
pub use virtualize::{
    Align, ContainerScroll, DocumentScroll, Layout, MountedRow, ScrollSource, Virtualizer,
};

#[cfg(test)]
mod fuzz;

pub mod api {
    pub use colloquy_api::*;
}
