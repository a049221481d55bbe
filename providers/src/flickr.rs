//! Flickr REST client.
//!
//! A search is two round trips: `flickr.photos.search` on a random result page
//! yields photo ids, then `flickr.photos.getSizes` per photo resolves the
//! `Medium` rendition URL. Size lookups run [`SIZE_LOOKUP_CONCURRENCY`] at a
//! time and the first failure fails the search.

use futures_util::stream::{self, StreamExt, TryStreamExt};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use memo_types::{ImageRef, ImageSize};

use crate::{ImageProvider, ProviderError, ProviderFut, download_image, http_client};

/// Canonical Flickr REST endpoint.
pub const FLICKR_REST_URL: &str = "https://api.flickr.com/services/rest/";
pub const DEFAULT_TAGS: &str = "kitten";

const SIZE_LOOKUP_CONCURRENCY: usize = 3;
const MEDIUM_LABEL: &str = "Medium";
/// Result pages to pick from so a restart shows different photos.
const RANDOM_PAGE_COUNT: u32 = 100;

#[derive(Debug, Deserialize)]
struct Envelope {
    stat: String,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    photos: PhotoPage,
}

#[derive(Debug, Deserialize)]
struct PhotoPage {
    photo: Vec<Photo>,
}

#[derive(Debug, Deserialize)]
struct Photo {
    id: String,
}

#[derive(Debug, Deserialize)]
struct SizesResponse {
    sizes: SizeList,
}

#[derive(Debug, Deserialize)]
struct SizeList {
    size: Vec<PhotoSize>,
}

#[derive(Debug, Deserialize)]
struct PhotoSize {
    label: String,
    source: String,
}

pub struct FlickrProvider {
    client: reqwest::Client,
    api_key: String,
    tags: String,
    base_url: String,
}

// Manual Debug impl to prevent leaking the API key in logs.
impl std::fmt::Debug for FlickrProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlickrProvider")
            .field("api_key", &"[REDACTED]")
            .field("tags", &self.tags)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl FlickrProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: http_client().clone(),
            api_key: api_key.into(),
            tags: DEFAULT_TAGS.to_string(),
            base_url: FLICKR_REST_URL.to_string(),
        }
    }

    #[must_use]
    pub fn with_tags(mut self, tags: impl Into<String>) -> Self {
        self.tags = tags.into();
        self
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    #[must_use]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &[(&str, String)],
    ) -> Result<T, ProviderError> {
        let mut query: Vec<(&str, &str)> = vec![
            ("method", method),
            ("api_key", self.api_key.as_str()),
            ("format", "json"),
            ("nojsoncallback", "1"),
        ];
        query.extend(params.iter().map(|(key, value)| (*key, value.as_str())));

        // The URL carries the API key, so errors name the method instead.
        let url = reqwest::Url::parse_with_params(&self.base_url, &query).map_err(|e| {
            ProviderError::Decode {
                target: self.base_url.clone(),
                message: format!("invalid base URL: {e}"),
            }
        })?;

        let response =
            self.client
                .get(url)
                .send()
                .await
                .map_err(|source| ProviderError::Http {
                    target: method.to_string(),
                    source: source.without_url(),
                })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status {
                target: method.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| ProviderError::Http {
                target: method.to_string(),
                source: source.without_url(),
            })?;
        tracing::debug!(method, bytes = body.len(), "Flickr response");

        let decode = |e: serde_json::Error| ProviderError::Decode {
            target: method.to_string(),
            message: e.to_string(),
        };

        let envelope: Envelope = serde_json::from_slice(&body).map_err(decode)?;
        if envelope.stat != "ok" {
            return Err(ProviderError::Api {
                method: method.to_string(),
                message: envelope
                    .message
                    .unwrap_or_else(|| format!("stat={}", envelope.stat)),
            });
        }

        serde_json::from_slice(&body).map_err(decode)
    }

    async fn search_photo_ids(&self, count: usize) -> Result<Vec<String>, ProviderError> {
        let page = rand::random_range(1..=RANDOM_PAGE_COUNT);
        let response: SearchResponse = self
            .call(
                "flickr.photos.search",
                &[
                    ("tags", self.tags.clone()),
                    ("page", page.to_string()),
                    ("per_page", count.to_string()),
                ],
            )
            .await?;

        let ids: Vec<String> = response
            .photos
            .photo
            .into_iter()
            .map(|photo| photo.id)
            .collect();
        tracing::debug!(page, requested = count, found = ids.len(), "Flickr search");
        Ok(ids)
    }

    async fn medium_url(&self, photo_id: String) -> Result<String, ProviderError> {
        let response: SizesResponse = self
            .call("flickr.photos.getSizes", &[("photo_id", photo_id.clone())])
            .await?;

        response
            .sizes
            .size
            .into_iter()
            .find(|size| size.label == MEDIUM_LABEL)
            .map(|size| size.source)
            .ok_or(ProviderError::MissingSize {
                photo_id,
                label: MEDIUM_LABEL,
            })
    }
}

impl ImageProvider for FlickrProvider {
    fn search(&self, count: usize) -> ProviderFut<'_, Vec<String>> {
        Box::pin(async move {
            let ids = self.search_photo_ids(count).await?;
            stream::iter(ids)
                .map(|id| self.medium_url(id))
                .buffered(SIZE_LOOKUP_CONCURRENCY)
                .try_collect::<Vec<String>>()
                .await
        })
    }

    fn load<'a>(&'a self, identifier: &'a str, size: ImageSize) -> ProviderFut<'a, ImageRef> {
        Box::pin(download_image(&self.client, identifier, size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> FlickrProvider {
        FlickrProvider::new("test-key")
            .with_client(reqwest::Client::new())
            .with_base_url(format!("{}/services/rest/", server.uri()))
    }

    async fn mount_sizes(server: &MockServer, photo_id: &str, labels: &[&str]) {
        let sizes: Vec<_> = labels
            .iter()
            .map(|label| {
                json!({
                    "label": label,
                    "source": format!("{}/img/{photo_id}_{label}.jpg", server.uri()),
                })
            })
            .collect();
        Mock::given(method("GET"))
            .and(path("/services/rest/"))
            .and(query_param("method", "flickr.photos.getSizes"))
            .and(query_param("photo_id", photo_id))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "stat": "ok", "sizes": { "size": sizes } })),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn search_resolves_medium_urls() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/services/rest/"))
            .and(query_param("method", "flickr.photos.search"))
            .and(query_param("api_key", "test-key"))
            .and(query_param("tags", "kitten"))
            .and(query_param("per_page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "stat": "ok",
                "photos": { "photo": [ { "id": "11" }, { "id": "22" } ] }
            })))
            .expect(1)
            .mount(&server)
            .await;
        mount_sizes(&server, "11", &["Small", "Medium", "Large"]).await;
        mount_sizes(&server, "22", &["Medium"]).await;

        let urls = provider(&server).search(2).await.unwrap();

        assert_eq!(
            urls,
            vec![
                format!("{}/img/11_Medium.jpg", server.uri()),
                format!("{}/img/22_Medium.jpg", server.uri()),
            ]
        );
    }

    #[tokio::test]
    async fn missing_medium_size_fails_the_search() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(query_param("method", "flickr.photos.search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "stat": "ok",
                "photos": { "photo": [ { "id": "33" } ] }
            })))
            .mount(&server)
            .await;
        mount_sizes(&server, "33", &["Thumbnail"]).await;

        let err = provider(&server).search(1).await.unwrap_err();
        assert!(
            matches!(err, ProviderError::MissingSize { ref photo_id, .. } if photo_id == "33"),
            "unexpected error: {err}"
        );
    }

    #[tokio::test]
    async fn api_failure_surfaces_flickr_message() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "stat": "fail",
                "code": 100,
                "message": "Invalid API Key (Key has invalid format)"
            })))
            .mount(&server)
            .await;

        let err = provider(&server).search(4).await.unwrap_err();
        match err {
            ProviderError::Api { method, message } => {
                assert_eq!(method, "flickr.photos.search");
                assert!(message.contains("Invalid API Key"));
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn http_error_status_is_reported() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = provider(&server).search(4).await.unwrap_err();
        assert!(matches!(err, ProviderError::Status { status: 503, .. }));
        assert!(!err.to_string().contains("test-key"));
    }

    #[tokio::test]
    async fn load_downloads_image_bytes() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/img/cat.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xFF, 0xD8, 0xFF]))
            .mount(&server)
            .await;

        let url = format!("{}/img/cat.jpg", server.uri());
        let image = provider(&server)
            .load(&url, ImageSize::new(100, 80))
            .await
            .unwrap();

        match image {
            ImageRef::Bitmap(bitmap) => {
                assert_eq!(bitmap.bytes(), &[0xFF, 0xD8, 0xFF]);
                assert_eq!(bitmap.size(), ImageSize::new(100, 80));
            }
            ImageRef::Resource(_) => panic!("expected a bitmap"),
        }
    }

    #[tokio::test]
    async fn load_reports_missing_image() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let url = format!("{}/img/gone.jpg", server.uri());
        let err = provider(&server)
            .load(&url, ImageSize::new(10, 10))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Status { status: 404, .. }));
    }

    #[test]
    fn debug_redacts_api_key() {
        let rendered = format!("{:?}", FlickrProvider::new("super-secret"));
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("REDACTED"));
    }
}
