use serde::{Deserialize, Serialize};
use validator::Validate;

/// Open Graph metadata returned by `GET /api/ogp` and the fetch-ogp action.
///
/// Every field is optional: a page may carry no OG tags at all, and an
/// all-`None` record is still a successful extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OgpRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub og_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub og_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub og_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub og_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub og_site_name: Option<String>,
}

impl OgpRecord {
    pub fn is_empty(&self) -> bool {
        self.og_title.is_none()
            && self.og_description.is_none()
            && self.og_image.is_none()
            && self.og_url.is_none()
            && self.og_site_name.is_none()
    }
}

/// Body of `POST /api/actions/fetch-ogp`.
#[derive(Debug, Deserialize, Validate)]
pub struct FetchOgpRequest {
    #[validate(length(min = 1, max = 2048))]
    pub url: String,
}
