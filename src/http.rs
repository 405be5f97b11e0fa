//! Request plumbing shared by the catalog and backend clients.
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::model::MessageBody;

pub(crate) const USER_AGENT: &str = "bookshelf/0.1";

pub(crate) fn build_client(timeout: Duration) -> Result<Client, ApiError> {
    Ok(Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()?)
}

/// Append percent-encoded path segments to `base`.
pub(crate) fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, ApiError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| ApiError::Url(format!("{base} cannot be a base URL")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Log a request with its credentials redacted.
pub(crate) fn log_request(request: &reqwest::Request) {
    debug!(method = %request.method(), url = %request.url(), "outgoing request");
    for (name, value) in request.headers() {
        if name.as_str().eq_ignore_ascii_case("authorization") {
            debug!("  {}: Bearer [REDACTED]", name);
        } else {
            debug!("  {}: {}", name, value.to_str().unwrap_or("[invalid]"));
        }
    }
}

/// Turn a non-2xx response into `ApiError::Status`, keeping the backend's
/// `{message}` when it sends one.
pub(crate) async fn ensure_success(res: Response) -> Result<Response, ApiError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().await.unwrap_or_default();
    let message = serde_json::from_str::<MessageBody>(&body)
        .map(|b| b.message)
        .unwrap_or(body);
    warn!(status = status.as_u16(), %message, "remote call failed");
    Err(ApiError::Status {
        status: status.as_u16(),
        message,
    })
}

/// Decode a successful JSON body. The text is read first so a malformed body
/// surfaces as `ApiError::Decode` rather than a transport error.
pub(crate) async fn read_json<T: DeserializeOwned>(res: Response) -> Result<T, ApiError> {
    let res = ensure_success(res).await?;
    let body = res.text().await?;
    Ok(serde_json::from_str(&body)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_appends_encoded_segments() {
        let base = Url::parse("http://localhost:5000/api/").unwrap();
        let url = endpoint(&base, &["reviews", "book", "a b/c"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:5000/api/reviews/book/a%20b%2Fc");
    }

    #[test]
    fn endpoint_rejects_opaque_base() {
        let base = Url::parse("mailto:someone@example.com").unwrap();
        assert!(matches!(endpoint(&base, &["x"]), Err(ApiError::Url(_))));
    }
}
