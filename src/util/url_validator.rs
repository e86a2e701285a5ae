use std::net::IpAddr;
use thiserror::Error;
use url::Url;

/// Errors that can occur while validating the item server's base URL.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// Plain http to a host that is not loopback.
    #[error("Insecure server URL: HTTPS required except for localhost ({0})")]
    InsecureScheme(String),
    /// The URL has no host component.
    #[error("Server URL has no host")]
    MissingHost,
    /// Query strings and fragments would be clobbered by endpoint joins.
    #[error("Server URL must not carry a query or fragment")]
    UnexpectedQuery,
}

/// Validates the base URL of the item server.
///
/// HTTPS is required. Plain HTTP is accepted only for loopback hosts
/// (`localhost`, `127.0.0.0/8`, `::1`) so local development servers and test
/// doubles work without a certificate. The returned URL always ends with `/`
/// so endpoint paths can be joined onto it.
///
/// # Examples
///
/// ```
/// use riffle::util::validate_server_url;
///
/// let url = validate_server_url("https://reader.example.com/api").unwrap();
/// assert_eq!(url.as_str(), "https://reader.example.com/api/");
///
/// assert!(validate_server_url("http://127.0.0.1:8080").is_ok());
/// assert!(validate_server_url("http://reader.example.com").is_err());
/// assert!(validate_server_url("file:///etc/passwd").is_err());
/// ```
pub fn validate_server_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let mut url = Url::parse(url_str.trim())?;

    let scheme = url.scheme().to_owned();
    match scheme.as_str() {
        "https" => {}
        "http" => {
            if !is_loopback_host(&url) {
                return Err(UrlValidationError::InsecureScheme(
                    url.host_str().unwrap_or_default().to_owned(),
                ));
            }
        }
        other => return Err(UrlValidationError::UnsupportedScheme(other.to_owned())),
    }

    if url.host_str().is_none_or(str::is_empty) {
        return Err(UrlValidationError::MissingHost);
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(UrlValidationError::UnexpectedQuery);
    }

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    Ok(url)
}

/// Returns true when the URL's host resolves to this machine without DNS.
pub fn is_loopback_host(url: &Url) -> bool {
    let Some(host) = url.host_str() else {
        return false;
    };
    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }

    // Strip brackets from IPv6 addresses for parsing
    let host_for_parse = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);

    host_for_parse
        .parse::<IpAddr>()
        .is_ok_and(|ip| ip.is_loopback())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_https_accepted() {
        assert!(validate_server_url("https://reader.example.com").is_ok());
        assert!(validate_server_url("https://reader.example.com:8443/api/v1").is_ok());
    }

    #[test]
    fn test_trailing_slash_added() {
        let url = validate_server_url("https://reader.example.com/api/v1").unwrap();
        assert_eq!(url.path(), "/api/v1/");
        assert_eq!(url.join("items").unwrap().path(), "/api/v1/items");
    }

    #[test]
    fn test_plain_http_rejected_for_remote_host() {
        let result = validate_server_url("http://reader.example.com");
        assert!(matches!(result, Err(UrlValidationError::InsecureScheme(_))));

        let result = validate_server_url("http://192.168.1.10:8080");
        assert!(matches!(result, Err(UrlValidationError::InsecureScheme(_))));
    }

    #[test]
    fn test_plain_http_allowed_for_loopback() {
        assert!(validate_server_url("http://localhost:3000").is_ok());
        assert!(validate_server_url("http://127.0.0.1:3000").is_ok());
        assert!(validate_server_url("http://[::1]:3000").is_ok());
    }

    #[test]
    fn test_invalid_schemes() {
        assert!(matches!(
            validate_server_url("file:///etc/passwd"),
            Err(UrlValidationError::UnsupportedScheme(_))
        ));
        assert!(validate_server_url("ftp://example.com").is_err());
    }

    #[test]
    fn test_query_rejected() {
        assert!(matches!(
            validate_server_url("https://reader.example.com/?token=abc"),
            Err(UrlValidationError::UnexpectedQuery)
        ));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(matches!(
            validate_server_url("not a url"),
            Err(UrlValidationError::InvalidUrl(_))
        ));
    }
}
