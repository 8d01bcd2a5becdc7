//! Wire and view shapes of the backend's resources.
//!
//! Wire shapes (`*Src`) mirror what the server may send: every field is
//! optional because the serializer omits or nulls fields on partially
//! built records. View shapes always carry every field, with `-1` standing
//! in for missing ids, `""` for missing text and `"Anonymous"` for a
//! missing user on merged images.

use serde::{Deserialize, Serialize};

pub const ANONYMOUS: &str = "Anonymous";
pub const DEFAULT_BACKGROUND: &str = "bg1";
pub const MISSING_ID: i64 = -1;

/// One clothing identification run, as sent by the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentificationSrc {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub upload_images: Option<String>,
    #[serde(default)]
    pub nation1: Option<String>,
    #[serde(default)]
    pub nation2: Option<String>,
    #[serde(default)]
    pub nation3: Option<String>,
    #[serde(default)]
    pub modified_nation: Option<String>,
    /// The user's verdict on the prediction, recorded by `user-assess`.
    #[serde(default)]
    pub user_assess: Option<String>,
    #[serde(default)]
    pub time_consuming: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<String>,
}

impl IdentificationSrc {
    pub fn placeholder() -> Self {
        IdentificationSrc {
            id: Some(MISSING_ID),
            ..Default::default()
        }
    }
}

/// One identification run with every field present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identification {
    pub id: i64,
    pub user: String,
    pub upload_images: String,
    pub nation1: String,
    pub nation2: String,
    pub nation3: String,
    pub modified_nation: String,
    pub user_assess: String,
    pub time_consuming: String,
    pub created: String,
    pub modified: String,
}

impl Identification {
    pub fn parse(src: &IdentificationSrc) -> Identification {
        let text = |field: &Option<String>| field.clone().unwrap_or_default();
        Identification {
            id: src.id.unwrap_or(MISSING_ID),
            user: text(&src.user),
            upload_images: text(&src.upload_images),
            nation1: text(&src.nation1),
            nation2: text(&src.nation2),
            nation3: text(&src.nation3),
            modified_nation: text(&src.modified_nation),
            user_assess: text(&src.user_assess),
            time_consuming: text(&src.time_consuming),
            created: text(&src.created),
            modified: text(&src.modified),
        }
    }

    /// The nation the user settled on, falling back to the top prediction.
    pub fn nation(&self) -> &str {
        if self.modified_nation.is_empty() {
            &self.nation1
        } else {
            &self.modified_nation
        }
    }
}

/// A two-person image composition, as sent by the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergedImageSrc {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub detail_url: Option<String>,
    #[serde(default)]
    pub background_name: Option<String>,
    #[serde(default)]
    pub result_image: Option<String>,
    #[serde(default)]
    pub person_1_head_image: Option<String>,
    #[serde(default)]
    pub person_2_head_image: Option<String>,
    #[serde(default)]
    pub person_1_identification: Option<i64>,
    #[serde(default)]
    pub person_2_identification: Option<i64>,
    #[serde(default)]
    pub person_1_identification_detail: Option<IdentificationSrc>,
    #[serde(default)]
    pub person_2_identification_detail: Option<IdentificationSrc>,
}

impl MergedImageSrc {
    pub fn placeholder() -> Self {
        MergedImageSrc {
            id: Some(MISSING_ID),
            user: Some(ANONYMOUS.to_string()),
            detail_url: Some(String::new()),
            background_name: Some(DEFAULT_BACKGROUND.to_string()),
            result_image: Some(String::new()),
            person_1_head_image: Some(String::new()),
            person_2_head_image: Some(String::new()),
            person_1_identification: Some(MISSING_ID),
            person_2_identification: Some(MISSING_ID),
            person_1_identification_detail: Some(IdentificationSrc::default()),
            person_2_identification_detail: Some(IdentificationSrc::default()),
        }
    }
}

/// A merged image with every field present and its background URL derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedImage {
    pub id: i64,
    pub user: String,
    pub detail_url: String,
    pub background_name: String,
    pub background_image_url: String,
    pub result_image: String,
    pub person_1_head_image: String,
    pub person_2_head_image: String,
    pub person_1_identification: i64,
    pub person_2_identification: i64,
    pub person_1_identification_detail: Identification,
    pub person_2_identification_detail: Identification,
}

impl MergedImage {
    /// `media_url` is the media root, e.g. `http://host/media/`.
    pub fn parse(src: &MergedImageSrc, media_url: &str) -> MergedImage {
        let text = |field: &Option<String>| field.clone().unwrap_or_default();
        let detail = |field: &Option<IdentificationSrc>| {
            Identification::parse(field.as_ref().unwrap_or(&IdentificationSrc::default()))
        };
        let background_name = text(&src.background_name);

        MergedImage {
            id: src.id.unwrap_or(MISSING_ID),
            user: src.user.clone().unwrap_or_else(|| ANONYMOUS.to_string()),
            detail_url: text(&src.detail_url),
            background_image_url: background_image_url(media_url, &background_name),
            background_name,
            result_image: text(&src.result_image),
            person_1_head_image: text(&src.person_1_head_image),
            person_2_head_image: text(&src.person_2_head_image),
            person_1_identification: src.person_1_identification.unwrap_or(MISSING_ID),
            person_2_identification: src.person_2_identification.unwrap_or(MISSING_ID),
            person_1_identification_detail: detail(&src.person_1_identification_detail),
            person_2_identification_detail: detail(&src.person_2_identification_detail),
        }
    }

    /// Whether the server has produced the composed picture.
    pub fn is_merged(&self) -> bool {
        !self.result_image.is_empty()
    }
}

pub fn background_image_url(media_url: &str, background_name: &str) -> String {
    let root = media_url.trim_end_matches('/');
    format!("{root}/background-image/{background_name}.png")
}

#[cfg(test)]
mod tests {
    use super::*;

    const MEDIA: &str = "http://localhost:8000/media/";

    #[test]
    fn placeholder_parses_to_loading_record() {
        let view = MergedImage::parse(&MergedImageSrc::placeholder(), MEDIA);
        assert_eq!(view.id, -1);
        assert_eq!(view.user, "Anonymous");
        assert_eq!(view.background_name, "bg1");
        assert_eq!(
            view.background_image_url,
            "http://localhost:8000/media/background-image/bg1.png"
        );
        assert_eq!(view.person_1_identification_detail.id, -1);
        assert!(!view.is_merged());
    }

    #[test]
    fn missing_fields_get_defaults() {
        let src: MergedImageSrc = serde_json::from_str(
            r#"{"id": 4, "user": null, "person_1_identification_detail": {"nation1": "Miao"}}"#,
        )
        .unwrap();
        let view = MergedImage::parse(&src, MEDIA);

        assert_eq!(view.id, 4);
        assert_eq!(view.user, "Anonymous");
        assert_eq!(view.detail_url, "");
        assert_eq!(view.background_name, "");
        assert_eq!(view.person_2_identification, -1);
        assert_eq!(view.person_1_identification_detail.nation1, "Miao");
        assert_eq!(view.person_1_identification_detail.user, "");
        assert_eq!(view.person_2_identification_detail.id, -1);
    }

    #[test]
    fn background_url_tolerates_missing_trailing_slash() {
        assert_eq!(
            background_image_url("http://cdn/media", "bg2"),
            "http://cdn/media/background-image/bg2.png"
        );
    }

    #[test]
    fn identification_prefers_user_correction() {
        let mut view = Identification::parse(&IdentificationSrc {
            nation1: Some("Miao".into()),
            ..Default::default()
        });
        assert_eq!(view.nation(), "Miao");
        view.modified_nation = "Dai".into();
        assert_eq!(view.nation(), "Dai");
    }

    #[test]
    fn identification_keeps_user_assessment() {
        let src: IdentificationSrc =
            serde_json::from_str(r#"{"id": 2, "nation1": "Dai", "user_assess": "good"}"#).unwrap();
        let view = Identification::parse(&src);
        assert_eq!(view.user_assess, "good");
        assert_eq!(Identification::parse(&IdentificationSrc::placeholder()).user_assess, "");
    }
}
