//! JSON-over-HTTP helpers shared by the catalog and job service clients.

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tracing::warn;

/// Errors from a single HTTP exchange.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{message}")]
    Status {
        url: String,
        status: u16,
        message: String,
    },

    #[error("Truncated response from {url}: declared {declared} bytes, received {received}")]
    Truncated {
        url: String,
        declared: u64,
        received: usize,
    },

    #[error("Invalid JSON from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

impl HttpError {
    /// Whether the request never got a response (DNS, refused, reset).
    pub fn is_connect(&self) -> bool {
        matches!(self, Self::Transport(e) if e.is_connect())
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Turn a non-2xx response into [`HttpError::Status`].
pub fn ensure_success(response: Response) -> Result<Response, HttpError> {
    match response.error_for_status_ref() {
        Ok(_) => Ok(response),
        Err(e) => Err(HttpError::Status {
            url: response.url().to_string(),
            status: response.status().as_u16(),
            message: e.to_string(),
        }),
    }
}

/// A body is complete unless the server declared a different length.
pub fn body_is_complete(declared: Option<u64>, received: usize) -> bool {
    declared.map_or(true, |n| n == received as u64)
}

/// GET `url` with `query` and decode the JSON body.
///
/// A body that ends before its declared `Content-Length`, or whose length
/// differs from it, is fetched once more; a second short body is
/// [`HttpError::Truncated`].
pub async fn get_json<T: DeserializeOwned>(
    client: &Client,
    url: &str,
    query: &[(&str, String)],
) -> Result<T, HttpError> {
    let mut retried = false;
    loop {
        let response = ensure_success(client.get(url).query(query).send().await?)?;
        let declared = response.content_length();
        let received = match response.bytes().await {
            Ok(body) if body_is_complete(declared, body.len()) => {
                return serde_json::from_slice(&body).map_err(|source| HttpError::Decode {
                    url: url.to_string(),
                    source,
                });
            }
            Ok(body) => body.len(),
            // hyper rejects a body shorter than its declared length.
            Err(e) if is_incomplete_body(&e) => 0,
            Err(e) => return Err(e.into()),
        };

        let declared = declared.unwrap_or_default();
        if retried {
            return Err(HttpError::Truncated {
                url: url.to_string(),
                declared,
                received,
            });
        }
        warn!(url, declared, received, "Truncated response, retrying once");
        retried = true;
    }
}

fn is_incomplete_body(err: &reqwest::Error) -> bool {
    err.is_body() || err.is_decode()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_is_complete() {
        assert!(body_is_complete(None, 10));
        assert!(body_is_complete(Some(10), 10));
        assert!(!body_is_complete(Some(12), 10));
    }

    #[test]
    fn test_status_error_message() {
        let err = HttpError::Status {
            url: "http://x/v4/p/jobs".into(),
            status: 404,
            message: "HTTP status client error (404 Not Found) for url (http://x/v4/p/jobs)".into(),
        };
        assert_eq!(err.status(), Some(404));
        assert!(err.to_string().contains("404 Not Found"));
        assert!(!err.is_connect());
    }
}
