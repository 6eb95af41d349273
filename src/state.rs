use std::collections::HashMap;

use crossbeam_channel::Sender;

use crate::data::{Completion, Reply};
use crate::handle::Handle;

/// Logical async field of a cell. Each slot holds at most one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Thumbnail,
    Profile,
    Avatar,
    LikeStatus,
}

impl Slot {
    pub const ALL: [Slot; 4] = [Slot::Thumbnail, Slot::Profile, Slot::Avatar, Slot::LikeStatus];

    pub fn name(self) -> &'static str {
        match self {
            Slot::Thumbnail => "thumbnail",
            Slot::Profile => "profile",
            Slot::Avatar => "avatar",
            Slot::LikeStatus => "like-status",
        }
    }
}

/// Identity a request was issued under. Results only land while it is still
/// the cell's current post (or tracked author).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Owner {
    Post(String),
    Author(String),
}

struct Pending {
    request_id: u64,
    owner: Owner,
    ticket: Handle,
    handle: Handle,
}

impl Pending {
    fn cancel(&self) {
        self.ticket.cancel();
        self.handle.cancel();
    }

    fn is_live(&self) -> bool {
        !self.ticket.is_cancelled() && !self.handle.is_cancelled()
    }
}

pub struct CellState {
    bound_post: Option<String>,
    tracked_author: Option<String>,
    pending: HashMap<Slot, Pending>,
    next_request_id: u64,
    tx: Sender<Completion>,
}

impl CellState {
    pub(crate) fn new(tx: Sender<Completion>) -> Self {
        Self {
            bound_post: None,
            tracked_author: None,
            pending: HashMap::new(),
            next_request_id: 1,
            tx,
        }
    }

    pub fn bound_post(&self) -> Option<&str> {
        self.bound_post.as_deref()
    }

    pub(crate) fn set_bound_post(&mut self, id: &str) {
        self.bound_post = Some(id.to_string());
    }

    pub fn tracked_author(&self) -> Option<&str> {
        self.tracked_author.as_deref()
    }

    pub(crate) fn set_tracked_author(&mut self, id: Option<&str>) {
        self.tracked_author = id.map(str::to_string);
    }

    /// Cancels whatever `slot` holds, then stores the handle `start` returns
    /// for a fresh request.
    pub fn replace<T, F>(&mut self, slot: Slot, owner: Owner, start: F) -> u64
    where
        F: FnOnce(Reply<T>) -> Handle,
    {
        self.cancel(slot);

        let request_id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1);

        let ticket = Handle::new();
        let reply = Reply::new(self.tx.clone(), slot, request_id, ticket.clone());
        let handle = start(reply);
        tracing::debug!(slot = slot.name(), request_id, ?owner, "request issued");
        self.pending.insert(
            slot,
            Pending {
                request_id,
                owner,
                ticket,
                handle,
            },
        );
        request_id
    }

    pub fn cancel(&mut self, slot: Slot) {
        if let Some(pending) = self.pending.remove(&slot) {
            if pending.is_live() {
                tracing::debug!(
                    slot = slot.name(),
                    request_id = pending.request_id,
                    "request cancelled"
                );
            }
            pending.cancel();
        }
    }

    /// Whether a completion still belongs to what the cell shows.
    pub(crate) fn accepts(&self, completion: &Completion) -> bool {
        let Some(pending) = self.pending.get(&completion.slot) else {
            return false;
        };
        if pending.request_id != completion.request_id || !pending.is_live() {
            return false;
        }
        match &pending.owner {
            Owner::Post(id) => self.bound_post.as_deref() == Some(id.as_str()),
            Owner::Author(id) => self.tracked_author.as_deref() == Some(id.as_str()),
        }
    }

    /// Drops a single-shot request once its result has been applied.
    pub(crate) fn finish(&mut self, slot: Slot) {
        self.pending.remove(&slot);
    }

    pub fn request_id(&self, slot: Slot) -> Option<u64> {
        self.pending.get(&slot).map(|pending| pending.request_id)
    }

    pub fn handle(&self, slot: Slot) -> Option<&Handle> {
        self.pending.get(&slot).map(|pending| &pending.handle)
    }

    /// Number of stored requests that have not been cancelled.
    pub fn outstanding(&self) -> usize {
        self.pending.values().filter(|pending| pending.is_live()).count()
    }

    /// Cancels every slot and forgets the bound post and author. Safe to call
    /// more than once.
    pub fn dispose(&mut self) {
        for slot in Slot::ALL {
            self.cancel(slot);
        }
        self.bound_post = None;
        self.tracked_author = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Payload;
    use crossbeam_channel::unbounded;

    fn completion(slot: Slot, request_id: u64) -> Completion {
        Completion {
            slot,
            request_id,
            payload: Payload::Liked(true),
        }
    }

    #[test]
    fn replace_cancels_previous_handle() {
        let (tx, _rx) = unbounded();
        let mut state = CellState::new(tx);
        state.set_bound_post("a");

        let mut first = None;
        state.replace::<bool, _>(Slot::Thumbnail, Owner::Post("a".into()), |reply| {
            first = Some(reply.ticket().clone());
            Handle::new()
        });
        let first = first.unwrap();
        state.replace::<bool, _>(Slot::Thumbnail, Owner::Post("a".into()), |_| Handle::new());

        assert!(first.is_cancelled());
        assert_eq!(state.outstanding(), 1);
    }

    #[test]
    fn accepts_checks_request_and_owner() {
        let (tx, _rx) = unbounded();
        let mut state = CellState::new(tx);
        state.set_bound_post("a");
        let old = state.replace::<bool, _>(Slot::LikeStatus, Owner::Post("a".into()), |_| {
            Handle::new()
        });
        let current = state.replace::<bool, _>(Slot::LikeStatus, Owner::Post("a".into()), |_| {
            Handle::new()
        });

        assert!(!state.accepts(&completion(Slot::LikeStatus, old)));
        assert!(state.accepts(&completion(Slot::LikeStatus, current)));

        state.set_bound_post("b");
        assert!(!state.accepts(&completion(Slot::LikeStatus, current)));
    }

    #[test]
    fn author_owned_requests_follow_tracked_author() {
        let (tx, _rx) = unbounded();
        let mut state = CellState::new(tx);
        state.set_bound_post("a");
        state.set_tracked_author(Some("u1"));
        let id = state.replace::<bool, _>(Slot::Profile, Owner::Author("u1".into()), |_| {
            Handle::new()
        });

        state.set_bound_post("b");
        assert!(state.accepts(&completion(Slot::Profile, id)));

        state.set_tracked_author(Some("u2"));
        assert!(!state.accepts(&completion(Slot::Profile, id)));
    }

    #[test]
    fn dispose_is_idempotent() {
        let (tx, _rx) = unbounded();
        let mut state = CellState::new(tx);
        state.set_bound_post("a");
        for slot in Slot::ALL {
            state.replace::<bool, _>(slot, Owner::Post("a".into()), |_| Handle::new());
        }
        assert_eq!(state.outstanding(), 4);

        state.dispose();
        state.dispose();
        assert_eq!(state.outstanding(), 0);
        assert_eq!(state.bound_post(), None);
        assert_eq!(state.tracked_author(), None);
    }
}
