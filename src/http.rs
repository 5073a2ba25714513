//! HTTP client construction and response checks shared by every endpoint.

use reqwest::{Client, RequestBuilder, Response};
use std::collections::HashMap;

use crate::client::ClientError;
use crate::options::TransportOptions;

/// Longest error body kept in `ClientError::Status`.
const MAX_ERROR_BODY: usize = 512;

/// Build a configured HTTP client from transport options.
///
/// Only the connect phase gets a timeout; bodies are streamed for as long
/// as the server keeps sending.
pub fn build_http_client(transport_options: &TransportOptions) -> Result<Client, ClientError> {
    let mut builder = Client::builder();

    if let Some(timeout) = transport_options.connect_timeout {
        builder = builder.connect_timeout(timeout);
    }

    if let Some(proxy_url) = &transport_options.proxy {
        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|e| ClientError::Config(format!("invalid proxy {:?}: {}", proxy_url, e)))?;
        builder = builder.proxy(proxy);
    }

    Ok(builder.build()?)
}

/// Add extra headers to a request if specified in transport options.
pub fn add_extra_headers(
    mut request: RequestBuilder,
    extra_headers: &Option<HashMap<String, String>>,
) -> RequestBuilder {
    if let Some(headers) = extra_headers {
        for (key, value) in headers {
            request = request.header(key, value);
        }
    }
    request
}

/// Pass successful responses through; turn anything else into
/// `ClientError::Status` carrying a prefix of the body.
pub async fn check_status(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let mut end = MAX_ERROR_BODY;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
    }
    tracing::debug!(%status, %body, "quiz service returned an error status");
    Err(ClientError::Status { status, body })
}
