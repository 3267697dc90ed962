//! Content model
//!
//! A module's content is a list of `Content` links, each pointing at exactly
//! one item of a concrete kind. Items of every kind share the same base
//! shape (owner, title, timestamps) and differ only in their payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The four concrete content kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Text,
    Video,
    Image,
    File,
}

impl ContentKind {
    pub const ALL: [ContentKind; 4] = [
        ContentKind::Text,
        ContentKind::Video,
        ContentKind::Image,
        ContentKind::File,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Text => "text",
            ContentKind::Video => "video",
            ContentKind::Image => "image",
            ContentKind::File => "file",
        }
    }

    /// Table holding items of this kind
    pub fn table(&self) -> &'static str {
        match self {
            ContentKind::Text => "texts",
            ContentKind::Video => "videos",
            ContentKind::Image => "images",
            ContentKind::File => "files",
        }
    }

    /// Column holding the kind-specific payload
    pub fn payload_column(&self) -> &'static str {
        match self {
            ContentKind::Text => "content",
            ContentKind::Video => "url",
            ContentKind::Image | ContentKind::File => "file",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned for any token outside the four permitted kinds
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown content kind: {0}")]
pub struct UnknownContentKind(pub String);

impl FromStr for ContentKind {
    type Err = UnknownContentKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(ContentKind::Text),
            "video" => Ok(ContentKind::Video),
            "image" => Ok(ContentKind::Image),
            "file" => Ok(ContentKind::File),
            _ => Err(UnknownContentKind(s.to_string())),
        }
    }
}

/// Fields shared by every content item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemBase {
    pub id: i64,
    pub owner_id: i64,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Kind-specific payload of a content item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ContentPayload {
    Text { content: String },
    Video { url: String },
    Image { file: String },
    File { file: String },
}

impl ContentPayload {
    pub fn kind(&self) -> ContentKind {
        match self {
            ContentPayload::Text { .. } => ContentKind::Text,
            ContentPayload::Video { .. } => ContentKind::Video,
            ContentPayload::Image { .. } => ContentKind::Image,
            ContentPayload::File { .. } => ContentKind::File,
        }
    }

    /// The payload column value
    pub fn value(&self) -> &str {
        match self {
            ContentPayload::Text { content } => content,
            ContentPayload::Video { url } => url,
            ContentPayload::Image { file } | ContentPayload::File { file } => file,
        }
    }

    /// Rebuild a payload from its kind and stored column value
    pub fn from_parts(kind: ContentKind, value: String) -> Self {
        match kind {
            ContentKind::Text => ContentPayload::Text { content: value },
            ContentKind::Video => ContentPayload::Video { url: value },
            ContentKind::Image => ContentPayload::Image { file: value },
            ContentKind::File => ContentPayload::File { file: value },
        }
    }
}

/// A concrete content item (text, video, image or file)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    #[serde(flatten)]
    pub base: ItemBase,
    #[serde(flatten)]
    pub payload: ContentPayload,
}

impl ContentItem {
    pub fn kind(&self) -> ContentKind {
        self.payload.kind()
    }
}

/// Validated title and payload ready to be persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDraft {
    pub title: String,
    pub payload: ContentPayload,
}

/// Link between a module and one content item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    pub id: i64,
    pub module_id: i64,
    pub kind: ContentKind,
    pub object_id: i64,
    pub order: i32,
}

/// A content link resolved to its item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleContent {
    #[serde(flatten)]
    pub content: Content,
    pub item: ContentItem,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tokens() {
        for kind in ContentKind::ALL {
            assert_eq!(kind.as_str().parse::<ContentKind>().unwrap(), kind);
        }
        assert!("Text".parse::<ContentKind>().is_err());
        assert!("audio".parse::<ContentKind>().is_err());
        assert!("".parse::<ContentKind>().is_err());
    }

    #[test]
    fn test_payload_parts() {
        let payload = ContentPayload::from_parts(ContentKind::Video, "https://vimeo.com/1".into());
        assert_eq!(payload.kind(), ContentKind::Video);
        assert_eq!(payload.value(), "https://vimeo.com/1");
        assert_eq!(ContentKind::Image.payload_column(), "file");
        assert_eq!(ContentKind::Text.table(), "texts");
    }

    #[test]
    fn test_item_serializes_flat_with_kind_tag() {
        let now = Utc::now();
        let item = ContentItem {
            base: ItemBase {
                id: 3,
                owner_id: 1,
                title: "Intro".into(),
                created_at: now,
                updated_at: now,
            },
            payload: ContentPayload::Text {
                content: "# Hello".into(),
            },
        };

        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["kind"], "text");
        assert_eq!(json["content"], "# Hello");
        assert_eq!(json["title"], "Intro");
        assert_eq!(json["id"], 3);
    }
}
