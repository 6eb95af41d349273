use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Deserialize;

use crate::binder::{CellBinder, Options, Services};
use crate::config;
use crate::data::{ImageService, MemoryLikes, MemoryProfiles, StaticViewer};
use crate::media;
use crate::model::{Picture, Post, PostCell, Profile};
use crate::state::Slot;

const ICON_LIKES: &str = "♥";
const ICON_COMMENTS: &str = "💬";
const DEFAULT_POOL_SIZE: usize = 3;
const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub feed_path: PathBuf,
    pub config_file: Option<PathBuf>,
    pub pool_size: Option<usize>,
}

/// Input document for the preview: posts plus the data the lookups serve.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Feed {
    pub posts: Vec<Post>,
    #[serde(default)]
    pub profiles: Vec<Profile>,
    #[serde(default)]
    pub liked: Vec<String>,
}

pub fn load_feed(path: &Path) -> Result<Feed> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read feed file at {}", path.display()))?;
    let feed: Feed = serde_json::from_str(&data)
        .with_context(|| format!("Failed to parse feed file at {}", path.display()))?;
    Ok(feed)
}

/// Binds every post of a feed through a small pool of recycled rows and prints
/// each row once its lookups settle.
pub fn run(options: RunOptions) -> Result<()> {
    let cfg = config::load(config::LoadOptions {
        config_file: options.config_file.clone(),
        env_prefix: None,
    })
    .context("load config")?;
    let feed = load_feed(&options.feed_path)?;

    let loader = media::Loader::new(media::Config {
        workers: cfg.media.workers,
        timeout: cfg.media.timeout,
        max_bytes: cfg.media.max_bytes,
        http_client: None,
    })
    .context("start media loader")?;
    let images: Arc<dyn ImageService> = Arc::new(loader);

    let likes = Arc::new(MemoryLikes::new());
    if let Some(viewer_id) = cfg.viewer.id.as_deref() {
        for post_id in &feed.liked {
            likes.set_liked(post_id, viewer_id, true);
        }
    }

    let services = Services {
        images,
        profiles: Arc::new(MemoryProfiles::new(feed.profiles.clone())),
        likes,
        viewer: Arc::new(StaticViewer::new(cfg.viewer.id.clone())),
    };

    let pool_size = options.pool_size.unwrap_or(DEFAULT_POOL_SIZE).max(1);
    let mut pool: Vec<CellBinder> = (0..pool_size)
        .map(|_| CellBinder::new(services.clone(), Options::from(&cfg.cell)))
        .collect();

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let now = Utc::now();
    for (index, post) in feed.posts.iter().enumerate() {
        let binder = &mut pool[index % pool_size];
        binder.set_position(Some(index));
        binder.bind_at(post, now);
        settle(binder, cfg.media.timeout);
        writeln!(out, "{}", render_row(index, binder.cell())).context("write row")?;
    }

    for binder in &mut pool {
        binder.dispose();
    }
    Ok(())
}

fn settle(binder: &mut CellBinder, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    loop {
        binder.poll();
        let waiting = [Slot::Thumbnail, Slot::Profile, Slot::Avatar]
            .into_iter()
            .any(|slot| binder.state().request_id(slot).is_some());
        if !waiting {
            break;
        }
        if Instant::now() >= deadline {
            tracing::warn!(
                post = binder.state().bound_post().unwrap_or_default(),
                "lookups still pending after {}",
                humantime::format_duration(timeout)
            );
            break;
        }
        thread::sleep(POLL_INTERVAL);
    }
}

pub fn render_row(index: usize, cell: &PostCell) -> String {
    let avatar = if cell.avatar.visible {
        picture_label(&cell.avatar.picture)
    } else {
        "hidden".to_string()
    };
    format!(
        "[{index}] {title}\n    {description}\n    {like} {ICON_LIKES} {likes}   {ICON_COMMENTS} {comments}   {date}   thumb: {thumb}   avatar: {avatar}",
        title = cell.title,
        description = cell.description_plain(),
        like = cell.like_icon.glyph(),
        likes = cell.likes,
        comments = cell.comments,
        date = cell.date,
        thumb = picture_label(&cell.thumbnail.picture),
    )
}

fn picture_label(picture: &Picture) -> String {
    match picture {
        Picture::Placeholder => "placeholder".to_string(),
        Picture::Loaded { source, image } => {
            format!("{} ({}x{})", source, image.width(), image.height())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ImageView, LikeIcon};
    use tempfile::tempdir;

    #[test]
    fn parses_feed_document() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("feed.json");
        fs::write(
            &path,
            r#"{
                "posts": [{
                    "id": "p1",
                    "title": "First",
                    "description": "hello",
                    "likes_count": 12,
                    "comments_count": 3,
                    "created_at": "2024-05-10T09:00:00Z",
                    "author_id": "u1"
                }],
                "profiles": [{"id": "u1"}],
                "liked": ["p1"]
            }"#,
        )
        .unwrap();

        let feed = load_feed(&path).unwrap();
        assert_eq!(feed.posts.len(), 1);
        assert_eq!(feed.posts[0].likes_count, 12);
        assert_eq!(feed.posts[0].image_path, None);
        assert_eq!(feed.profiles[0].photo_url, None);
        assert_eq!(feed.liked, vec!["p1".to_string()]);
    }

    #[test]
    fn row_shows_hidden_avatar_and_placeholder() {
        let cell = PostCell {
            title: "Title".into(),
            likes: "12".into(),
            comments: "3".into(),
            date: "3 hours ago".into(),
            avatar: ImageView {
                visible: false,
                picture: Picture::Placeholder,
            },
            like_icon: LikeIcon::Active,
            ..PostCell::default()
        };
        let row = render_row(0, &cell);
        assert!(row.starts_with("[0] Title"));
        assert!(row.contains("♥ ♥ 12"));
        assert!(row.contains("thumb: placeholder"));
        assert!(row.contains("avatar: hidden"));
    }
}
