use std::sync::Arc;

use chrono::{DateTime, Utc};
use crossbeam_channel::{unbounded, Receiver};

use crate::config::CellConfig;
use crate::data::{
    Completion, CurrentViewer, ImageService, LikeStatusLookup, Payload, ProfileLookup,
};
use crate::format::{self, DEFAULT_DESCRIPTION_LIMIT};
use crate::markup;
use crate::model::{LikeIcon, Picture, Post, PostCell};
use crate::state::{CellState, Owner, Slot};

#[derive(Clone)]
pub struct Services {
    pub images: Arc<dyn ImageService>,
    pub profiles: Arc<dyn ProfileLookup>,
    pub likes: Arc<dyn LikeStatusLookup>,
    pub viewer: Arc<dyn CurrentViewer>,
}

pub struct Options {
    pub show_author: bool,
    pub description_limit: usize,
    pub on_activate: Option<Box<dyn Fn(usize)>>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            show_author: true,
            description_limit: DEFAULT_DESCRIPTION_LIMIT,
            on_activate: None,
        }
    }
}

impl From<&CellConfig> for Options {
    fn from(cfg: &CellConfig) -> Self {
        Self {
            show_author: cfg.show_author,
            description_limit: cfg.description_limit,
            on_activate: None,
        }
    }
}

/// Binds posts into one recyclable list row.
///
/// A binder lives as long as its row and is rebound many times. All methods
/// run on the thread that owns the row; background results queue up on an
/// internal channel and are applied by [`CellBinder::poll`], which drops any
/// result that no longer matches what the row shows.
pub struct CellBinder {
    services: Services,
    show_author: bool,
    description_limit: usize,
    on_activate: Option<Box<dyn Fn(usize)>>,
    position: Option<usize>,
    markup: markup::Renderer,
    cell: PostCell,
    state: CellState,
    response_rx: Receiver<Completion>,
}

impl CellBinder {
    pub fn new(services: Services, options: Options) -> Self {
        let (response_tx, response_rx) = unbounded();
        Self {
            services,
            show_author: options.show_author,
            description_limit: options.description_limit,
            on_activate: options.on_activate,
            position: None,
            markup: markup::Renderer::new(),
            cell: PostCell::default(),
            state: CellState::new(response_tx),
            response_rx,
        }
    }

    pub fn cell(&self) -> &PostCell {
        &self.cell
    }

    pub fn state(&self) -> &CellState {
        &self.state
    }

    pub fn bind(&mut self, post: &Post) {
        self.bind_at(post, Utc::now());
    }

    /// Like [`CellBinder::bind`] with an explicit "now" for the date label.
    pub fn bind_at(&mut self, post: &Post, now: DateTime<Utc>) {
        self.state.set_bound_post(&post.id);

        self.cell.title = post.title.clone();
        let description = format::decorate_description(&post.description, self.description_limit);
        self.cell.description = self.markup.render(&description);
        self.cell.likes = post.likes_count.to_string();
        self.cell.comments = post.comments_count.to_string();
        self.cell.date = format::relative_time(post.created_at, now);

        self.bind_thumbnail(post);
        self.bind_author(post);
        self.bind_like_status(post);
    }

    fn bind_thumbnail(&mut self, post: &Post) {
        self.cell.thumbnail.picture = Picture::Placeholder;
        let images = self.services.images.clone();
        let source = post.image_path.as_deref();
        self.state
            .replace(Slot::Thumbnail, Owner::Post(post.id.clone()), |reply| {
                images.load(source, reply)
            });
    }

    fn bind_author(&mut self, post: &Post) {
        let show_author = self.show_author;
        let Some(author_id) = post.author_id.as_deref().filter(|_| show_author) else {
            self.cell.avatar.visible = false;
            self.state.cancel(Slot::Profile);
            self.state.cancel(Slot::Avatar);
            self.state.set_tracked_author(None);
            return;
        };

        self.cell.avatar.visible = true;
        if self.state.tracked_author() == Some(author_id) {
            return;
        }

        self.state.cancel(Slot::Avatar);
        self.cell.avatar.picture = Picture::Placeholder;
        self.state.set_tracked_author(Some(author_id));
        let profiles = self.services.profiles.clone();
        self.state
            .replace(Slot::Profile, Owner::Author(author_id.to_string()), |reply| {
                profiles.fetch_once(author_id, reply)
            });
    }

    fn bind_like_status(&mut self, post: &Post) {
        self.cell.like_icon = LikeIcon::Inactive;
        let Some(viewer_id) = self.services.viewer.identity() else {
            self.state.cancel(Slot::LikeStatus);
            return;
        };

        let likes = self.services.likes.clone();
        self.state
            .replace(Slot::LikeStatus, Owner::Post(post.id.clone()), |reply| {
                likes.observe(&post.id, &viewer_id, reply)
            });
    }

    /// Applies queued background results. Returns true when a visible field
    /// changed.
    pub fn poll(&mut self) -> bool {
        let mut changed = false;
        while let Ok(completion) = self.response_rx.try_recv() {
            changed |= self.apply(completion);
        }
        changed
    }

    fn apply(&mut self, completion: Completion) -> bool {
        let slot = completion.slot;
        if !self.state.accepts(&completion) {
            tracing::debug!(
                slot = slot.name(),
                request_id = completion.request_id,
                "stale result discarded"
            );
            return false;
        }

        match completion.payload {
            Payload::Image(result) => {
                self.state.finish(slot);
                let view = match slot {
                    Slot::Thumbnail => &mut self.cell.thumbnail,
                    Slot::Avatar => &mut self.cell.avatar,
                    Slot::Profile | Slot::LikeStatus => return false,
                };
                view.picture = match result {
                    Ok(loaded) => Picture::Loaded {
                        source: loaded.source,
                        image: loaded.image,
                    },
                    Err(err) => {
                        tracing::warn!(slot = slot.name(), "image unavailable: {err:#}");
                        Picture::Placeholder
                    }
                };
                true
            }
            Payload::Profile(result) => {
                self.state.finish(slot);
                let profile = match result {
                    Ok(profile) => profile,
                    Err(err) => {
                        tracing::warn!("profile lookup failed: {err:#}");
                        return false;
                    }
                };
                let (Some(photo_url), Some(author_id)) = (
                    profile.photo_url,
                    self.state.tracked_author().map(str::to_string),
                ) else {
                    return false;
                };
                let images = self.services.images.clone();
                self.state
                    .replace(Slot::Avatar, Owner::Author(author_id), |reply| {
                        images.load(Some(photo_url.as_str()), reply)
                    });
                false
            }
            Payload::Liked(liked) => {
                let icon = LikeIcon::from_liked(liked);
                let changed = self.cell.like_icon != icon;
                self.cell.like_icon = icon;
                changed
            }
        }
    }

    /// Records where the row currently sits in the list. The host calls this
    /// whenever items move; `None` means the row is detached.
    pub fn set_position(&mut self, position: Option<usize>) {
        self.position = position;
    }

    pub fn position(&self) -> Option<usize> {
        self.position
    }

    /// Forwards an activation of the row to the observer, using the position
    /// the row holds right now. Returns whether the observer was notified.
    pub fn activate(&self) -> bool {
        let (Some(on_activate), Some(position)) = (self.on_activate.as_ref(), self.position)
        else {
            return false;
        };
        on_activate(position);
        true
    }

    /// Cancels all outstanding work and discards queued results.
    pub fn dispose(&mut self) {
        self.state.dispose();
        while self.response_rx.try_recv().is_ok() {}
    }
}

impl Drop for CellBinder {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{MemoryLikes, MemoryProfiles, ImageResult, Reply, StaticViewer};
    use crate::handle::Handle;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct NoImages;

    impl ImageService for NoImages {
        fn load(&self, _source: Option<&str>, reply: Reply<ImageResult>) -> Handle {
            reply.ticket().clone()
        }
    }

    fn services() -> Services {
        Services {
            images: Arc::new(NoImages),
            profiles: Arc::new(MemoryProfiles::default()),
            likes: Arc::new(MemoryLikes::new()),
            viewer: Arc::new(StaticViewer::anonymous()),
        }
    }

    #[test]
    fn activation_reads_position_at_call_time() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let mut binder = CellBinder::new(
            services(),
            Options {
                on_activate: Some(Box::new(move |position| sink.borrow_mut().push(position))),
                ..Options::default()
            },
        );

        assert!(!binder.activate());
        binder.set_position(Some(3));
        assert!(binder.activate());
        binder.set_position(Some(5));
        assert!(binder.activate());
        binder.set_position(None);
        assert!(!binder.activate());

        assert_eq!(*seen.borrow(), vec![3, 5]);
    }

    #[test]
    fn activation_without_observer_is_ignored() {
        let mut binder = CellBinder::new(services(), Options::default());
        binder.set_position(Some(0));
        assert!(!binder.activate());
    }

    #[test]
    fn options_follow_cell_config() {
        let options = Options::from(&CellConfig {
            description_limit: 80,
            show_author: false,
        });
        assert_eq!(options.description_limit, 80);
        assert!(!options.show_author);
        assert!(options.on_activate.is_none());
    }
}
