//! Test fixtures for generating test data and request bodies.

use axum::body::Body;
use axum::http::Request;
use bytes::Bytes;

/// A description that satisfies the default length rules.
#[allow(dead_code)]
pub const DESCRIPTION: &str =
    "A hand-made scenario with a long track, tricky corners and three checkpoints.";

/// Generate deterministic test data based on a seed.
#[allow(dead_code)]
pub fn seeded_bytes(seed: u64, len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    let mut state = seed;

    for chunk in data.chunks_mut(8) {
        // Simple LCG for deterministic data
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = state.to_le_bytes();
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte = bytes[i % 8];
        }
    }

    Bytes::from(data)
}

/// Builder for `multipart/form-data` request bodies.
#[allow(dead_code)]
pub struct MultipartForm {
    boundary: String,
    body: Vec<u8>,
}

#[allow(dead_code)]
impl MultipartForm {
    pub fn new() -> Self {
        Self {
            boundary: format!("lorry-test-{}", uuid::Uuid::new_v4().simple()),
            body: Vec::new(),
        }
    }

    /// Add a text field.
    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n",
                self.boundary
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(value.as_bytes());
        self.body.extend_from_slice(b"\r\n");
        self
    }

    /// Add a file part under the `files` field.
    pub fn file(mut self, filename: &str, data: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"{filename}\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n",
                self.boundary
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(data);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    /// Finish the body and wrap it in a request.
    pub fn into_request(mut self, method: &str, uri: &str, token: Option<&str>) -> Request<Body> {
        self.body
            .extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());

        let mut builder = Request::builder().method(method).uri(uri).header(
            "Content-Type",
            format!("multipart/form-data; boundary={}", self.boundary),
        );
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        builder.body(Body::from(self.body)).unwrap()
    }
}

/// A create form with valid title and description.
#[allow(dead_code)]
pub fn package_form(title: &str, tags: &str) -> MultipartForm {
    MultipartForm::new()
        .text("title", title)
        .text("description", DESCRIPTION)
        .text("tags", tags)
}
