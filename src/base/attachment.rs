use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// Blob-store resource class of an attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    #[default]
    Image,
    Video,
    #[serde(other)]
    Raw,
}

impl AttachmentKind {
    pub fn from_content_type(content_type: &str) -> Self {
        let content_type = content_type.to_ascii_lowercase();
        if content_type.starts_with("image/") {
            AttachmentKind::Image
        } else if content_type.starts_with("video/") {
            AttachmentKind::Video
        } else {
            AttachmentKind::Raw
        }
    }
}

/// A file stored in the blob store. Usually one record references it, but a
/// restored snapshot can leave several records pointing at the same blob.
///
/// Older records use `url` / `public_id` / `resource_type`; those names are
/// accepted on input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    /// Retrievable URL of the blob.
    #[serde(alias = "url", alias = "secure_url")]
    pub locator: String,
    /// Blob-store key.
    #[serde(alias = "public_id")]
    pub external_id: String,
    #[serde(default, alias = "resource_type", alias = "resourceType")]
    pub kind: AttachmentKind,
}

/// Drops later entries whose external id was already seen, keeping order.
pub fn dedup_by_external_id(attachments: Vec<Attachment>) -> Vec<Attachment> {
    attachments
        .into_iter()
        .unique_by(|a| a.external_id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_field_names() {
        let a: Attachment = serde_json::from_value(serde_json::json!({
            "url": "https://cdn.example/law-cases/a.jpg",
            "public_id": "law-cases/a",
            "resource_type": "image",
        }))
        .unwrap();
        assert_eq!(a.external_id, "law-cases/a");
        assert_eq!(a.kind, AttachmentKind::Image);

        let b: Attachment = serde_json::from_value(serde_json::json!({
            "locator": "https://cdn.example/x",
            "externalId": "x",
            "kind": "something-new",
        }))
        .unwrap();
        assert_eq!(b.kind, AttachmentKind::Raw);
    }

    #[test]
    fn test_kind_from_content_type() {
        assert_eq!(
            AttachmentKind::from_content_type("IMAGE/PNG"),
            AttachmentKind::Image
        );
        assert_eq!(
            AttachmentKind::from_content_type("application/pdf"),
            AttachmentKind::Raw
        );
    }

    #[test]
    fn test_dedup_keeps_first() {
        let mk = |id: &str, loc: &str| Attachment {
            locator: loc.to_string(),
            external_id: id.to_string(),
            kind: AttachmentKind::Image,
        };
        let out = dedup_by_external_id(vec![mk("a", "1"), mk("b", "2"), mk("a", "3")]);
        assert_eq!(out, vec![mk("a", "1"), mk("b", "2")]);
    }
}
