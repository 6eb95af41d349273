use std::sync::Arc;

use chrono::{DateTime, Utc};
use image::DynamicImage;
use ratatui::text::Text;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Post {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub likes_count: u64,
    #[serde(default)]
    pub comments_count: u64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub author_id: Option<String>,
    #[serde(default)]
    pub image_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    pub id: String,
    #[serde(default)]
    pub photo_url: Option<String>,
}

/// What an image view currently shows. Failed loads fall back to the
/// placeholder stub.
#[derive(Debug, Clone, Default)]
pub enum Picture {
    #[default]
    Placeholder,
    Loaded {
        source: String,
        image: Arc<DynamicImage>,
    },
}

impl Picture {
    pub fn is_placeholder(&self) -> bool {
        matches!(self, Picture::Placeholder)
    }

    pub fn source(&self) -> Option<&str> {
        match self {
            Picture::Placeholder => None,
            Picture::Loaded { source, .. } => Some(source),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImageView {
    pub visible: bool,
    pub picture: Picture,
}

impl Default for ImageView {
    fn default() -> Self {
        Self {
            visible: true,
            picture: Picture::Placeholder,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LikeIcon {
    #[default]
    Inactive,
    Active,
}

impl LikeIcon {
    pub fn from_liked(liked: bool) -> Self {
        if liked {
            LikeIcon::Active
        } else {
            LikeIcon::Inactive
        }
    }

    pub fn glyph(self) -> &'static str {
        match self {
            LikeIcon::Inactive => "♡",
            LikeIcon::Active => "♥",
        }
    }
}

/// The visual fields of one reusable list row.
#[derive(Debug, Clone, Default)]
pub struct PostCell {
    pub title: String,
    pub description: Text<'static>,
    pub likes: String,
    pub comments: String,
    pub date: String,
    pub thumbnail: ImageView,
    pub avatar: ImageView,
    pub like_icon: LikeIcon,
}

impl PostCell {
    /// Plain description text with styling dropped.
    pub fn description_plain(&self) -> String {
        self.description
            .lines
            .iter()
            .map(|line| {
                line.spans
                    .iter()
                    .map(|span| span.content.as_ref())
                    .collect::<String>()
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
