//! Per-kind content forms
//!
//! `KIND_SPECS` is the single table describing each content kind: which
//! fields a client may submit and how an item renders.
//! Anything not listed (owner, order, timestamps) is server-managed and never
//! bound from input.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::models::{ContentDraft, ContentItem, ContentKind, ContentPayload, FieldErrors};
use crate::services::render;

pub const MAX_TITLE_LEN: usize = 250;

/// How a field is presented and validated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Textarea,
    Url,
    File,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct FieldSpec {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
}

/// Capabilities of one content kind
#[derive(Debug, Clone, Copy, Serialize)]
pub struct KindSpec {
    pub kind: ContentKind,
    pub fields: &'static [FieldSpec],
    #[serde(skip)]
    pub render: fn(&ContentItem) -> String,
}

const TITLE: FieldSpec = FieldSpec {
    name: "title",
    field_type: FieldType::Text,
    required: true,
    max_length: Some(MAX_TITLE_LEN),
};

const fn payload_field(name: &'static str, field_type: FieldType) -> FieldSpec {
    FieldSpec {
        name,
        field_type,
        required: true,
        max_length: None,
    }
}

pub static KIND_SPECS: [KindSpec; 4] = [
    KindSpec {
        kind: ContentKind::Text,
        fields: &[TITLE, payload_field("content", FieldType::Textarea)],
        render: |item| render::render_text(item.payload.value()),
    },
    KindSpec {
        kind: ContentKind::Video,
        fields: &[TITLE, payload_field("url", FieldType::Url)],
        render: |item| render::render_video(item.payload.value()),
    },
    KindSpec {
        kind: ContentKind::Image,
        fields: &[TITLE, payload_field("file", FieldType::File)],
        render: |item| render::render_image(&item.base.title, item.payload.value()),
    },
    KindSpec {
        kind: ContentKind::File,
        fields: &[TITLE, payload_field("file", FieldType::File)],
        render: |item| render::render_file(&item.base.title, item.payload.value()),
    },
];

impl KindSpec {
    pub fn of(kind: ContentKind) -> &'static KindSpec {
        match kind {
            ContentKind::Text => &KIND_SPECS[0],
            ContentKind::Video => &KIND_SPECS[1],
            ContentKind::Image => &KIND_SPECS[2],
            ContentKind::File => &KIND_SPECS[3],
        }
    }

    /// The field carrying the kind-specific payload
    pub fn payload_field(&self) -> &'static FieldSpec {
        &self.fields[1]
    }
}

/// Binds client input to a kind's editable fields
pub struct ContentForm;

impl ContentForm {
    /// Validate `input` against the fields of `kind`.
    ///
    /// Unknown keys are ignored. On failure the errors are keyed by field name.
    pub fn bind(kind: ContentKind, input: &Value) -> Result<ContentDraft, FieldErrors> {
        let spec = KindSpec::of(kind);
        let mut errors = FieldErrors::new();

        let Some(object) = input.as_object() else {
            errors.add("non_field_errors", "Expected a JSON object.");
            return Err(errors);
        };

        let title = clean_field(&spec.fields[0], object, &mut errors);
        let payload = clean_field(spec.payload_field(), object, &mut errors);

        match (title, payload) {
            (Some(title), Some(payload)) if errors.is_empty() => Ok(ContentDraft {
                title,
                payload: ContentPayload::from_parts(kind, payload),
            }),
            _ => Err(errors),
        }
    }

    /// The current values of an item, keyed by field name
    pub fn initial(item: &ContentItem) -> Map<String, Value> {
        let spec = KindSpec::of(item.kind());
        let mut values = Map::new();
        values.insert("title".into(), Value::String(item.base.title.clone()));
        values.insert(
            spec.payload_field().name.into(),
            Value::String(item.payload.value().to_string()),
        );
        values
    }
}

fn clean_field(field: &FieldSpec, input: &Map<String, Value>, errors: &mut FieldErrors) -> Option<String> {
    let raw = match input.get(field.name) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(_) => {
            errors.add(field.name, "Enter a valid value.");
            return None;
        }
    };

    let value = match field.field_type {
        FieldType::Textarea => raw,
        _ => raw.trim().to_string(),
    };

    if value.trim().is_empty() {
        if field.required {
            errors.add(field.name, "This field is required.");
            return None;
        }
        return Some(value);
    }

    if let Some(max) = field.max_length {
        let len = value.chars().count();
        if len > max {
            errors.add(
                field.name,
                format!("Ensure this value has at most {} characters (it has {}).", max, len),
            );
            return None;
        }
    }

    match field.field_type {
        FieldType::Url if !is_http_url(&value) => {
            errors.add(field.name, "Enter a valid URL.");
            None
        }
        FieldType::File if !is_relative_path(&value) => {
            errors.add(field.name, "Enter a valid file path.");
            None
        }
        _ => Some(value),
    }
}

fn is_http_url(value: &str) -> bool {
    let rest = value
        .strip_prefix("https://")
        .or_else(|| value.strip_prefix("http://"));
    match rest {
        Some(rest) => {
            let host = rest.split(['/', '?', '#']).next().unwrap_or("");
            !host.is_empty() && !value.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

fn is_relative_path(value: &str) -> bool {
    !value.starts_with('/')
        && !value.contains('\\')
        && !value.split('/').any(|part| part == ".." || part.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_each_kind_renders_its_own_fragment() {
        let now = chrono::Utc::now();
        let item = |payload: ContentPayload| ContentItem {
            base: crate::models::ItemBase {
                id: 1,
                owner_id: 1,
                title: "Week 1".into(),
                created_at: now,
                updated_at: now,
            },
            payload,
        };

        let text = item(ContentPayload::Text {
            content: "**bold**".into(),
        });
        assert!((KindSpec::of(ContentKind::Text).render)(&text).contains("<strong>bold</strong>"));

        let video = item(ContentPayload::Video {
            url: "https://youtu.be/dQw4w9WgXcQ".into(),
        });
        assert!((KindSpec::of(ContentKind::Video).render)(&video).contains("<iframe"));

        let image = item(ContentPayload::Image {
            file: "images/a.png".into(),
        });
        assert_eq!(
            (KindSpec::of(ContentKind::Image).render)(&image),
            "<img src=\"/media/images/a.png\" alt=\"Week 1\">"
        );

        let file = item(ContentPayload::File {
            file: "files/a.pdf".into(),
        });
        assert_eq!(
            (KindSpec::of(ContentKind::File).render)(&file),
            "<a href=\"/media/files/a.pdf\" download>Week 1</a>"
        );
    }

    #[test]
    fn test_spec_table_matches_kinds() {
        for kind in ContentKind::ALL {
            let spec = KindSpec::of(kind);
            assert_eq!(spec.kind, kind);
            assert_eq!(spec.fields[0].name, "title");
            assert_eq!(spec.payload_field().name, kind.payload_column());
        }
    }

    #[test]
    fn test_bind_each_kind() {
        let text = ContentForm::bind(ContentKind::Text, &json!({"title": " Intro ", "content": "# Hi\n"})).unwrap();
        assert_eq!(text.title, "Intro");
        assert_eq!(text.payload, ContentPayload::Text { content: "# Hi\n".into() });

        let video = ContentForm::bind(ContentKind::Video, &json!({"title": "Talk", "url": "https://vimeo.com/1"})).unwrap();
        assert_eq!(video.payload.kind(), ContentKind::Video);

        let image = ContentForm::bind(ContentKind::Image, &json!({"title": "Pic", "file": "images/a.png"})).unwrap();
        assert_eq!(image.payload, ContentPayload::Image { file: "images/a.png".into() });
    }

    #[test]
    fn test_server_managed_fields_are_ignored() {
        let draft = ContentForm::bind(
            ContentKind::File,
            &json!({"title": "Notes", "file": "files/n.pdf", "owner_id": 99, "order": 7, "created_at": "x"}),
        )
        .unwrap();
        assert_eq!(draft.title, "Notes");
        assert_eq!(draft.payload.value(), "files/n.pdf");
    }

    #[test]
    fn test_bind_errors() {
        let errors = ContentForm::bind(ContentKind::Text, &json!({"content": "   "})).unwrap_err();
        assert!(errors.get("title").is_some());
        assert!(errors.get("content").is_some());

        let long = "x".repeat(MAX_TITLE_LEN + 1);
        let errors = ContentForm::bind(ContentKind::Video, &json!({"title": long, "url": "ftp://host/v"})).unwrap_err();
        assert!(errors.get("title").unwrap()[0].contains("at most 250"));
        assert_eq!(errors.get("url").unwrap(), ["Enter a valid URL."]);

        let errors = ContentForm::bind(ContentKind::Image, &json!({"title": "t", "file": "../etc/passwd"})).unwrap_err();
        assert!(errors.get("file").is_some());

        let errors = ContentForm::bind(ContentKind::Text, &json!({"title": 5, "content": "x"})).unwrap_err();
        assert_eq!(errors.get("title").unwrap(), ["Enter a valid value."]);

        assert!(ContentForm::bind(ContentKind::Text, &json!(["title"])).is_err());
    }

    #[test]
    fn test_url_and_path_checks() {
        assert!(is_http_url("http://example.com"));
        assert!(is_http_url("https://youtu.be/abc?t=1"));
        assert!(!is_http_url("https://"));
        assert!(!is_http_url("javascript:alert(1)"));
        assert!(!is_http_url("https://a b.com"));

        assert!(is_relative_path("files/2024/x.pdf"));
        assert!(!is_relative_path("/etc/passwd"));
        assert!(!is_relative_path("files//x"));
        assert!(!is_relative_path("files\\x"));
    }

    #[test]
    fn test_initial_values() {
        let now = chrono::Utc::now();
        let item = ContentItem {
            base: crate::models::ItemBase {
                id: 3,
                owner_id: 1,
                title: "Clip".into(),
                created_at: now,
                updated_at: now,
            },
            payload: ContentPayload::Video { url: "https://vimeo.com/2".into() },
        };
        let initial = ContentForm::initial(&item);
        assert_eq!(initial["title"], "Clip");
        assert_eq!(initial["url"], "https://vimeo.com/2");
        assert!((KindSpec::of(item.kind()).render)(&item).contains("player.vimeo.com"));
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn bound_titles_are_trimmed_and_bounded(title in "\\PC{0,300}", body in "\\PC{1,40}") {
                let input = json!({"title": title, "content": format!("x{}", body)});
                if let Ok(draft) = ContentForm::bind(ContentKind::Text, &input) {
                    prop_assert!(!draft.title.is_empty());
                    prop_assert_eq!(draft.title.trim(), draft.title.as_str());
                    prop_assert!(draft.title.chars().count() <= MAX_TITLE_LEN);
                }
            }
        }
    }
}
