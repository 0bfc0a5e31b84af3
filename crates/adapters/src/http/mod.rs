use std::thread;
use std::time::Duration;

use log::debug;
use pixseek_application::{ApplicationError, ImageFetcher, SearchBackend};
use pixseek_domain::{ResultImageRef, SearchFailure, SelectedImage};
use reqwest::blocking::{multipart, Client};
use serde::Deserialize;

/// Field name the backend expects the image bytes under.
const IMAGE_FIELD: &str = "image";
const SEARCH_PATH: &str = "/search-similar";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    similar_images: Vec<String>,
}

/// Client for the similarity-search backend. One endpoint, one attempt per
/// call, no retries; the base URL is injected so tests can point it at a
/// loopback server.
pub struct HttpSearchBackend {
    base_url: String,
    client: Client,
}

impl HttpSearchBackend {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApplicationError> {
        let client = Client::builder()
            .user_agent(format!("pixseek/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|error| ApplicationError::Io(format!("failed to build http client: {error}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn search_url(&self) -> String {
        format!("{}{}", self.base_url, SEARCH_PATH)
    }
}

impl SearchBackend for HttpSearchBackend {
    fn search_similar(&self, image: &SelectedImage) -> Result<Vec<ResultImageRef>, SearchFailure> {
        let part = multipart::Part::bytes(image.bytes.clone())
            .file_name(image.name.clone())
            .mime_str(image.format.mime_type())
            .map_err(|_| SearchFailure::Network)?;
        let form = multipart::Form::new().part(IMAGE_FIELD, part);

        let response = self
            .client
            .post(self.search_url())
            .multipart(form)
            .send()
            .map_err(|error| {
                debug!("search request failed before a response: {error}");
                SearchFailure::Network
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(SearchFailure::Service {
                status: status.as_u16(),
                message: format!("Search failed: {body}"),
            });
        }

        let parsed: SearchResponse = response.json().map_err(|error| {
            debug!("search response body was unreadable: {error}");
            SearchFailure::Network
        })?;
        Ok(parsed
            .similar_images
            .into_iter()
            .map(ResultImageRef::new)
            .collect())
    }
}

impl ImageFetcher for HttpSearchBackend {
    fn fetch(&self, reference: &ResultImageRef) -> Result<Vec<u8>, SearchFailure> {
        let response = self
            .client
            .get(reference.url())
            .send()
            .map_err(|_| SearchFailure::Network)?;
        let status = response.status();
        if !status.is_success() {
            return Err(SearchFailure::Service {
                status: status.as_u16(),
                message: format!("image fetch failed with status {}", status.as_u16()),
            });
        }
        let bytes = response.bytes().map_err(|_| SearchFailure::Network)?;
        Ok(bytes.to_vec())
    }
}

/// Stand-in backend for working without the real service: a fixed delay,
/// then the same eight placeholder references every time.
pub struct MockSearchBackend {
    delay: Duration,
}

const MOCK_RESULT_URLS: [&str; 8] = [
    "https://images.unsplash.com/photo-1542291026-7eec264c27ff?w=400&h=400&fit=crop",
    "https://images.unsplash.com/photo-1523275335684-37898b6baf30?w=400&h=400&fit=crop",
    "https://images.unsplash.com/photo-1560343090-f0409e92791a?w=400&h=400&fit=crop",
    "https://images.unsplash.com/photo-1505740420928-5e560c06d30e?w=400&h=400&fit=crop",
    "https://images.unsplash.com/photo-1572635196237-14b3f281503f?w=400&h=400&fit=crop",
    "https://images.unsplash.com/photo-1585386959984-a4155224a1ad?w=400&h=400&fit=crop",
    "https://images.unsplash.com/photo-1526170375885-4d8ecf77b99f?w=400&h=400&fit=crop",
    "https://images.unsplash.com/photo-1491553895911-0055eca6402d?w=400&h=400&fit=crop",
];

impl MockSearchBackend {
    pub fn new() -> Self {
        Self {
            delay: Duration::from_millis(1500),
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for MockSearchBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchBackend for MockSearchBackend {
    fn search_similar(&self, _image: &SelectedImage) -> Result<Vec<ResultImageRef>, SearchFailure> {
        thread::sleep(self.delay);
        Ok(MOCK_RESULT_URLS.iter().copied().map(ResultImageRef::new).collect())
    }
}

impl ImageFetcher for MockSearchBackend {
    /// Synthesizes a flat-colored PNG per reference so the grid has
    /// something to show offline.
    fn fetch(&self, reference: &ResultImageRef) -> Result<Vec<u8>, SearchFailure> {
        use image::codecs::png::PngEncoder;
        use image::{ColorType, ImageEncoder};

        let seed = reference
            .url()
            .bytes()
            .fold(0_u32, |acc, byte| acc.wrapping_mul(31).wrapping_add(byte as u32));
        let pixel = [
            64 + (seed % 128) as u8,
            64 + ((seed >> 8) % 128) as u8,
            64 + ((seed >> 16) % 128) as u8,
            255,
        ];

        const SIDE: u32 = 64;
        let mut raw = Vec::with_capacity((SIDE * SIDE * 4) as usize);
        for _ in 0..SIDE * SIDE {
            raw.extend_from_slice(&pixel);
        }

        let mut encoded = Vec::new();
        PngEncoder::new(&mut encoded)
            .write_image(&raw, SIDE, SIDE, ColorType::Rgba8)
            .map_err(|_| SearchFailure::Network)?;
        Ok(encoded)
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::{SocketAddr, TcpListener};

    use pixseek_domain::ImageFormat;

    use super::*;

    fn query_image() -> SelectedImage {
        SelectedImage::new("query.png", ImageFormat::Png, vec![9; 32])
    }

    /// Serves exactly one connection: drains the request, writes the canned
    /// response, closes.
    fn spawn_canned_server(status_line: &'static str, body: &'static str) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
        let addr = listener.local_addr().expect("local addr");
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept");
            stream
                .set_read_timeout(Some(Duration::from_millis(500)))
                .expect("read timeout");
            let mut sink = [0_u8; 4096];
            while let Ok(read) = stream.read(&mut sink) {
                if read == 0 {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(response.as_bytes());
        });
        addr
    }

    fn backend_for(addr: SocketAddr) -> HttpSearchBackend {
        HttpSearchBackend::new(format!("http://{addr}")).expect("client builds")
    }

    #[test]
    fn success_preserves_backend_order() {
        let addr = spawn_canned_server(
            "200 OK",
            r#"{"similar_images":["a","b","c"]}"#,
        );
        let results = backend_for(addr)
            .search_similar(&query_image())
            .expect("search succeeds");
        let urls: Vec<&str> = results.iter().map(ResultImageRef::url).collect();
        assert_eq!(urls, vec!["a", "b", "c"]);
    }

    #[test]
    fn missing_field_is_an_empty_list_not_an_error() {
        let addr = spawn_canned_server("200 OK", "{}");
        let results = backend_for(addr)
            .search_similar(&query_image())
            .expect("search succeeds");
        assert!(results.is_empty());
    }

    #[test]
    fn non_success_status_carries_status_and_body_text() {
        let addr = spawn_canned_server("500 Internal Server Error", "boom");
        let failure = backend_for(addr)
            .search_similar(&query_image())
            .expect_err("500 fails");
        match failure {
            SearchFailure::Service { status, message } => {
                assert_eq!(status, 500);
                assert!(message.contains("boom"), "message was: {message}");
            }
            other => panic!("expected service failure, got {other:?}"),
        }
    }

    #[test]
    fn refused_connection_is_a_network_failure() {
        // Bind and immediately drop to get a port nothing listens on.
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
            listener.local_addr().expect("local addr")
        };
        let failure = backend_for(addr)
            .search_similar(&query_image())
            .expect_err("refused connection fails");
        assert_eq!(failure, SearchFailure::Network);
        assert_eq!(
            failure.to_string(),
            pixseek_domain::NETWORK_FAILURE_MESSAGE
        );
    }

    #[test]
    fn unreadable_success_body_is_a_network_failure() {
        let addr = spawn_canned_server("200 OK", "not json");
        let failure = backend_for(addr)
            .search_similar(&query_image())
            .expect_err("bad body fails");
        assert_eq!(failure, SearchFailure::Network);
    }

    #[test]
    fn trailing_slash_in_base_url_is_tolerated() {
        let backend = HttpSearchBackend::new("http://localhost:8000/").expect("client builds");
        assert_eq!(backend.search_url(), "http://localhost:8000/search-similar");
    }

    #[test]
    fn mock_backend_returns_the_canned_set() {
        let backend = MockSearchBackend::with_delay(Duration::from_millis(0));
        let results = backend
            .search_similar(&query_image())
            .expect("mock succeeds");
        assert_eq!(results.len(), 8);
        assert_eq!(results[0].url(), MOCK_RESULT_URLS[0]);
    }

    #[test]
    fn mock_fetch_produces_decodable_png_bytes() {
        let backend = MockSearchBackend::with_delay(Duration::from_millis(0));
        let bytes = backend
            .fetch(&ResultImageRef::new("https://example.com/a.png"))
            .expect("mock fetch succeeds");
        let decoded = image::load_from_memory(&bytes).expect("png decodes");
        assert_eq!(decoded.width(), 64);
        assert_eq!(decoded.height(), 64);
    }
}
