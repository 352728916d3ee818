use super::util::{has_header, host_header_value, parse_http_url};
use super::{HttpRequest, Result};

/// Estimate bytes sent for an HTTP request.
///
/// Best-effort HTTP/1.1 framing: request line + headers + CRLF + body. Host and Content-Length are
/// counted even when the caller did not set them, since the client adds them.
pub fn estimate_http_request_bytes(req: &HttpRequest) -> Result<u64> {
    estimate_http_request_bytes_parts(&req.method, &req.url, &req.headers, req.body.len() as u64)
}

pub(super) fn estimate_http_request_bytes_parts(
    method: &http::Method,
    url: &str,
    headers: &[(String, String)],
    body_len: u64,
) -> Result<u64> {
    let parsed = parse_http_url(url)?;

    let mut bytes = request_line_bytes(method, &parsed);

    for (k, v) in headers {
        bytes = bytes.saturating_add(header_bytes(k.as_bytes(), v.as_bytes()));
    }

    if !has_header(headers, "host")
        && let Some(host) = host_header_value(&parsed)
    {
        bytes = bytes.saturating_add(header_bytes(b"host", host.as_bytes()));
    }

    if body_len != 0 && !has_header(headers, "content-length") {
        let v = body_len.to_string();
        bytes = bytes.saturating_add(header_bytes(b"content-length", v.as_bytes()));
    }

    // End of headers.
    Ok(bytes.saturating_add(2).saturating_add(body_len))
}

fn request_line_bytes(method: &http::Method, url: &url::Url) -> u64 {
    let path_len = url.path().len() + url.query().map_or(0, |q| q.len() + 1);

    // "METHOD SP path SP HTTP/1.1 CRLF"
    (method.as_str().len() as u64)
        .saturating_add(1)
        .saturating_add(path_len as u64)
        .saturating_add(1)
        .saturating_add("HTTP/1.1".len() as u64)
        .saturating_add(2)
}

pub(super) fn estimate_http1_response_head_bytes(
    version: http::Version,
    status: http::StatusCode,
    headers: &http::HeaderMap,
) -> u64 {
    let mut bytes = status_line_bytes(version, status);
    for (name, value) in headers.iter() {
        bytes = bytes.saturating_add(header_bytes(name.as_str().as_bytes(), value.as_bytes()));
    }
    bytes.saturating_add(2)
}

fn status_line_bytes(version: http::Version, status: http::StatusCode) -> u64 {
    let version_str = match version {
        http::Version::HTTP_10 => "HTTP/1.0",
        http::Version::HTTP_2 => "HTTP/2",
        http::Version::HTTP_3 => "HTTP/3",
        _ => "HTTP/1.1",
    };

    // "HTTP/1.1 SP 200 CRLF" (reason phrase ignored)
    (version_str.len() as u64)
        .saturating_add(1)
        .saturating_add(status.as_str().len() as u64)
        .saturating_add(2)
}

fn header_bytes(name: &[u8], value: &[u8]) -> u64 {
    // "name: value\r\n"
    (name.len() as u64)
        .saturating_add(2)
        .saturating_add(value.len() as u64)
        .saturating_add(2)
}
