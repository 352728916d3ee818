pub(super) fn has_header(headers: &[(String, String)], name: &str) -> bool {
    headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
}

pub(super) fn host_header_value(parsed: &url::Url) -> Option<String> {
    let host = parsed.host_str()?;
    match parsed.port() {
        Some(port) => Some(format!("{host}:{port}")),
        None => Some(host.to_string()),
    }
}

/// Parses and checks an absolute `http`/`https` URL.
pub(super) fn parse_http_url(url: &str) -> Result<url::Url, crate::Error> {
    let parsed = url::Url::parse(url).map_err(|_| crate::Error::InvalidUrl(url.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        _ => Err(crate::Error::UnsupportedScheme(url.to_string())),
    }
}
