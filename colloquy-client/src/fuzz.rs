#![cfg(test)]

use std::collections::{HashMap, HashSet};

use crate::{
    api::{CommentId, CommentRef, FeedMessage},
    store::tests::comment,
    CommentStore, Location, Mutation, Origin, Outcome,
};

// Few ids, so that scripts hit the same comments over and over
const ID_SPACE: u8 = 12;

fn id(raw: u8) -> i64 {
    i64::from(raw % ID_SPACE) + 1
}

#[derive(Clone, Copy, Debug, bolero::generator::TypeGenerator)]
enum FuzzOrigin {
    Page,
    Feed,
    Local,
}

impl From<FuzzOrigin> for Origin {
    fn from(o: FuzzOrigin) -> Origin {
        match o {
            FuzzOrigin::Page => Origin::Page,
            FuzzOrigin::Feed => Origin::Feed,
            FuzzOrigin::Local => Origin::Local,
        }
    }
}

#[derive(Clone, Copy, Debug, bolero::generator::TypeGenerator)]
enum FuzzOp {
    InsertRoot {
        id: u8,
        reply_count: u8,
        origin: FuzzOrigin,
    },
    InsertReply {
        id: u8,
        parent: u8,
        origin: FuzzOrigin,
        parent_reply_count: Option<u8>,
    },
    Remove {
        id: u8,
    },
    /// Goes through the wire encoding, like feed events do
    RemoveFromFeed {
        id: u8,
        parent: Option<u8>,
    },
    ReplyCount {
        id: u8,
        count: u8,
    },
    SetOpen {
        parent: u8,
        open: bool,
    },
}

struct Checker {
    store: CommentStore,
    reply_counts: HashMap<CommentId, u32>,
}

impl Checker {
    fn new() -> Checker {
        Checker {
            store: CommentStore::new(),
            reply_counts: HashMap::new(),
        }
    }

    fn root_ids(&self) -> Vec<CommentId> {
        self.store.root_comments().iter().map(|c| c.id).collect()
    }

    fn insert(&mut self, m: Mutation) {
        let Mutation::Insert {
            comment,
            parent_reply_count,
            ..
        } = &m
        else {
            unreachable!()
        };
        let (id, parent, reply_count) = (comment.id, comment.parent_id, comment.reply_count);
        let was_there = self.store.contains(id);
        let parent_is_root = parent.map(|p| self.store.is_root(p));
        let outcome = self.store.reconcile(m.clone());
        if was_there {
            assert_eq!(outcome, Outcome::Duplicate);
            return;
        }
        match parent_is_root {
            None => {
                self.reply_counts.insert(id, reply_count);
            }
            Some(false) => {
                assert!(!self.store.contains(id), "orphan {id} was inserted");
            }
            Some(true) => {
                // `parent` is Some whenever `parent_is_root` is
                let parent = parent.unwrap();
                if let Some(count) = parent_reply_count {
                    self.reply_counts.insert(parent, *count);
                }
                if self.store.contains(id) {
                    self.reply_counts.insert(id, reply_count);
                }
            }
        }
    }

    fn run(&mut self, op: FuzzOp) {
        let roots_before = self.root_ids();
        let touches_roots = match op {
            FuzzOp::InsertRoot {
                id: raw,
                reply_count,
                origin,
            } => {
                let mut c = comment(id(raw), None);
                c.reply_count = u32::from(reply_count);
                self.insert(Mutation::insert(c, origin.into()));
                true
            }
            FuzzOp::InsertReply {
                id: raw,
                parent,
                origin,
                parent_reply_count,
            } => {
                self.insert(Mutation::Insert {
                    comment: comment(id(raw), Some(id(parent))),
                    origin: origin.into(),
                    parent_reply_count: parent_reply_count.map(u32::from),
                });
                // Inserting a reply whose id is a root's is a duplicate
                false
            }
            FuzzOp::Remove { id: raw } | FuzzOp::RemoveFromFeed { id: raw, .. } => {
                let target = CommentId(id(raw));
                let was_root = self.store.is_root(target);
                let m = match op {
                    FuzzOp::RemoveFromFeed { parent, .. } => {
                        let msg = FeedMessage::CommentDeleted {
                            comment: CommentRef {
                                id: target,
                                parent_id: parent.map(|p| CommentId(id(p))),
                            },
                        };
                        Mutation::from(FeedMessage::decode(&msg.encode()).unwrap())
                    }
                    _ => Mutation::Remove(target),
                };
                self.store.reconcile(m);
                assert!(!self.store.contains(target), "{target} survived removal");
                assert_eq!(
                    self.store.reconcile(Mutation::Remove(target)),
                    Outcome::NotFound(target),
                );
                self.reply_counts.remove(&target);
                was_root
            }
            FuzzOp::ReplyCount { id: raw, count } => {
                let target = CommentId(id(raw));
                let was_there = self.store.contains(target);
                let outcome = self.store.reconcile(Mutation::ReplyCount {
                    id: target,
                    count: u32::from(count),
                });
                if was_there {
                    self.reply_counts.insert(target, u32::from(count));
                } else {
                    assert_eq!(outcome, Outcome::NotFound(target));
                    assert!(!self.store.contains(target));
                }
                false
            }
            FuzzOp::SetOpen { parent, open } => {
                let parent = CommentId(id(parent));
                let is_root = self.store.is_root(parent);
                assert_eq!(self.store.set_reply_open(parent, open), is_root);
                false
            }
        };
        if !touches_roots {
            assert_eq!(roots_before, self.root_ids(), "reply mutation changed root order");
        }
        self.check();
    }

    fn check(&self) {
        let mut seen = HashSet::new();
        for (location, c) in self.store.probe_order() {
            assert!(seen.insert(c.id), "{} is in the store twice", c.id);
            match location {
                Location::Root(_) => assert!(c.is_root()),
                Location::Reply { parent, .. } => assert_eq!(c.parent_id, Some(parent)),
            }
            assert_eq!(
                Some(&c.reply_count),
                self.reply_counts.get(&c.id),
                "reply count of {} is not the last one delivered",
                c.id,
            );
        }
        assert_eq!(seen.len(), self.store.len());
    }
}

#[test]
fn store_invariants_hold_under_any_mutation_script() {
    if std::env::var("RUST_LOG").is_ok() {
        // Several tests may try to install it
        let _ = tracing_subscriber::fmt::try_init();
    }
    bolero::check!()
        .with_generator(bolero::generator::gen_with::<Vec<FuzzOp>>().len(1..200usize))
        .cloned()
        .for_each(|script| {
            let mut checker = Checker::new();
            for op in script {
                checker.run(op);
            }
        });
}

#[test]
fn replaying_a_script_changes_nothing() {
    bolero::check!()
        .with_generator(bolero::generator::gen_with::<Vec<FuzzOp>>().len(1..50usize))
        .cloned()
        .for_each(|script| {
            let inserts: Vec<Mutation> = script
                .into_iter()
                .filter_map(|op| match op {
                    FuzzOp::InsertRoot { id: raw, origin, .. } => {
                        Some(Mutation::insert(comment(id(raw), None), origin.into()))
                    }
                    FuzzOp::InsertReply {
                        id: raw,
                        parent,
                        origin,
                        ..
                    } => Some(Mutation::insert(
                        comment(id(raw), Some(id(parent))),
                        origin.into(),
                    )),
                    _ => None,
                })
                .collect();
            let mut store = CommentStore::new();
            for m in &inserts {
                store.reconcile(m.clone());
            }
            let snapshot: Vec<_> = store.probe_order().map(|(l, c)| (l, c.id)).collect();
            for m in inserts {
                store.reconcile(m);
            }
            let replayed: Vec<_> = store.probe_order().map(|(l, c)| (l, c.id)).collect();
            assert_eq!(snapshot, replayed);
        });
}
