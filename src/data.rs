use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use crossbeam_channel::Sender;
use image::DynamicImage;
use parking_lot::{Mutex, RwLock};

use crate::handle::Handle;
use crate::model::Profile;
use crate::state::Slot;

#[derive(Debug, Clone)]
pub struct LoadedImage {
    pub source: String,
    pub image: Arc<DynamicImage>,
}

pub type ImageResult = Result<LoadedImage>;
pub type ProfileResult = Result<Profile>;

pub trait ImageService: Send + Sync {
    /// Starts loading `source` (a URL or local path). The outcome is delivered
    /// through `reply`; `None` sources are answered with an error.
    fn load(&self, source: Option<&str>, reply: Reply<ImageResult>) -> Handle;
}

pub trait ProfileLookup: Send + Sync {
    fn fetch_once(&self, author_id: &str, reply: Reply<ProfileResult>) -> Handle;
}

pub trait LikeStatusLookup: Send + Sync {
    /// Subscribes to the like flag for `(post_id, viewer_id)`. The reply may be
    /// used any number of times until the returned handle is cancelled.
    fn observe(&self, post_id: &str, viewer_id: &str, reply: Reply<bool>) -> Handle;
}

pub trait CurrentViewer: Send + Sync {
    fn identity(&self) -> Option<String>;
}

pub enum Payload {
    Image(ImageResult),
    Profile(ProfileResult),
    Liked(bool),
}

impl From<ImageResult> for Payload {
    fn from(value: ImageResult) -> Self {
        Payload::Image(value)
    }
}

impl From<ProfileResult> for Payload {
    fn from(value: ProfileResult) -> Self {
        Payload::Profile(value)
    }
}

impl From<bool> for Payload {
    fn from(value: bool) -> Self {
        Payload::Liked(value)
    }
}

pub(crate) struct Completion {
    pub slot: Slot,
    pub request_id: u64,
    pub payload: Payload,
}

/// Sends one request's results back to the thread that owns the cell.
pub struct Reply<T> {
    tx: Sender<Completion>,
    slot: Slot,
    request_id: u64,
    ticket: Handle,
    _marker: PhantomData<fn(T)>,
}

impl<T> Clone for Reply<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            slot: self.slot,
            request_id: self.request_id,
            ticket: self.ticket.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> Reply<T> {
    pub(crate) fn new(tx: Sender<Completion>, slot: Slot, request_id: u64, ticket: Handle) -> Self {
        Self {
            tx,
            slot,
            request_id,
            ticket,
            _marker: PhantomData,
        }
    }

    /// Cancelled when the cell moves on from this request. Services may hand
    /// out a clone as their own handle.
    pub fn ticket(&self) -> &Handle {
        &self.ticket
    }

    pub fn is_cancelled(&self) -> bool {
        self.ticket.is_cancelled()
    }
}

impl<T> Reply<T>
where
    T: Into<Payload>,
{
    /// Returns false when the request was cancelled or the cell is gone.
    pub fn send(&self, value: T) -> bool {
        if self.ticket.is_cancelled() {
            return false;
        }
        self.tx
            .send(Completion {
                slot: self.slot,
                request_id: self.request_id,
                payload: value.into(),
            })
            .is_ok()
    }
}

#[derive(Default)]
pub struct MemoryProfiles {
    profiles: RwLock<HashMap<String, Profile>>,
}

impl MemoryProfiles {
    pub fn new<I>(profiles: I) -> Self
    where
        I: IntoIterator<Item = Profile>,
    {
        let profiles = profiles
            .into_iter()
            .map(|profile| (profile.id.clone(), profile))
            .collect();
        Self {
            profiles: RwLock::new(profiles),
        }
    }

    pub fn insert(&self, profile: Profile) {
        self.profiles.write().insert(profile.id.clone(), profile);
    }
}

impl ProfileLookup for MemoryProfiles {
    fn fetch_once(&self, author_id: &str, reply: Reply<ProfileResult>) -> Handle {
        let result = self
            .profiles
            .read()
            .get(author_id)
            .cloned()
            .ok_or_else(|| anyhow!("profile {author_id} not found"));
        reply.send(result);
        reply.ticket().clone()
    }
}

struct LikeObserver {
    post_id: String,
    viewer_id: String,
    reply: Reply<bool>,
}

#[derive(Default)]
pub struct MemoryLikes {
    liked: RwLock<HashSet<(String, String)>>,
    observers: Mutex<Vec<LikeObserver>>,
}

impl MemoryLikes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_liked(&self, post_id: &str, viewer_id: &str) -> bool {
        self.liked
            .read()
            .contains(&(post_id.to_string(), viewer_id.to_string()))
    }

    /// Updates the flag and notifies every live subscription for the pair.
    pub fn set_liked(&self, post_id: &str, viewer_id: &str, liked: bool) {
        let key = (post_id.to_string(), viewer_id.to_string());
        {
            let mut set = self.liked.write();
            if liked {
                set.insert(key);
            } else {
                set.remove(&key);
            }
        }
        let mut observers = self.observers.lock();
        observers.retain(|observer| !observer.reply.is_cancelled());
        for observer in observers.iter() {
            if observer.post_id == post_id && observer.viewer_id == viewer_id {
                observer.reply.send(liked);
            }
        }
    }

    pub fn live_observers(&self) -> usize {
        self.observers
            .lock()
            .iter()
            .filter(|observer| !observer.reply.is_cancelled())
            .count()
    }
}

impl LikeStatusLookup for MemoryLikes {
    fn observe(&self, post_id: &str, viewer_id: &str, reply: Reply<bool>) -> Handle {
        // Held across the read so a concurrent set_liked reaches this observer.
        let mut observers = self.observers.lock();
        observers.retain(|observer| !observer.reply.is_cancelled());
        reply.send(self.has_liked(post_id, viewer_id));
        let handle = reply.ticket().clone();
        observers.push(LikeObserver {
            post_id: post_id.to_string(),
            viewer_id: viewer_id.to_string(),
            reply,
        });
        handle
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaticViewer {
    id: Option<String>,
}

impl StaticViewer {
    pub fn new(id: Option<String>) -> Self {
        Self { id }
    }

    pub fn anonymous() -> Self {
        Self { id: None }
    }
}

impl CurrentViewer for StaticViewer {
    fn identity(&self) -> Option<String> {
        self.id.clone()
    }
}
