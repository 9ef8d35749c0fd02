//! Client side of a run: send a `RequestSpec`, buffer what comes back

use std::fmt::Write as _;

use bytes::Bytes;
use htc_core::RequestSpec;
use log::debug;
use reqwest::Method;

use crate::runner::RunError;

/// Send `spec` to `http://<target><uri>` and buffer the whole response
pub async fn send(
    http: &reqwest::Client,
    target: &str,
    spec: &RequestSpec,
) -> Result<http::Response<Bytes>, RunError> {
    let method = Method::from_bytes(spec.method.as_bytes())
        .map_err(|_| RunError::Setup(format!("invalid request method {:?}", spec.method)))?;
    let url = format!("http://{}{}", target, spec.uri);
    debug!("client: {} {}", method, url);

    let mut builder = http.request(method, url);
    for (name, value) in &spec.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    if !spec.body.is_empty() {
        builder = builder.body(spec.body.clone());
    }

    let resp = builder.send().await?;
    let status = resp.status();
    let headers = resp.headers().clone();
    let body = resp.bytes().await?;

    let mut buffered = http::Response::new(body);
    *buffered.status_mut() = status;
    *buffered.headers_mut() = headers;
    Ok(buffered)
}

/// Status line and headers of a received response, one per line
pub fn describe_response(resp: &http::Response<Bytes>) -> String {
    let mut out = format!("HTTP {}\n", resp.status().as_u16());
    for (name, value) in resp.headers() {
        let _ = writeln!(out, "{}: {}", name, String::from_utf8_lossy(value.as_bytes()));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_response() {
        let resp = http::Response::builder()
            .status(418)
            .header("X-One", "1")
            .header("Content-Type", "text/plain")
            .body(Bytes::new())
            .unwrap();
        assert_eq!(
            describe_response(&resp),
            "HTTP 418\nx-one: 1\ncontent-type: text/plain\n"
        );
    }

    #[test]
    fn test_describe_response_without_headers() {
        let resp = http::Response::new(Bytes::from_static(b"ignored"));
        assert_eq!(describe_response(&resp), "HTTP 200\n");
    }
}
