use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{
    Response, StatusCode, Url,
    header::{ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, HeaderMap},
};

/// The parts of a response head the fetcher cares about, detached from the body.
#[derive(Debug, Clone)]
pub struct ResponseInfo {
    status: StatusCode,
    request_url: Url,
    response_headers: HeaderMap,
}

impl ResponseInfo {
    #[cfg(test)]
    fn new(status: StatusCode, request_url: Url, response_headers: HeaderMap) -> Self {
        Self {
            status,
            request_url,
            response_headers,
        }
    }

    pub fn is_successful(&self) -> bool {
        self.status.is_success()
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn url(&self) -> &Url {
        &self.request_url
    }

    pub fn is_partial(&self) -> bool {
        self.status == StatusCode::PARTIAL_CONTENT
    }

    pub fn is_range_not_satisfiable(&self) -> bool {
        self.status == StatusCode::RANGE_NOT_SATISFIABLE
    }

    /// Retrieve the content_length of the response.
    ///
    /// Returns None if the "content-length" header is missing or if its value
    /// is not a u64.
    pub fn content_length(&self) -> Option<u64> {
        self.response_headers
            .get(CONTENT_LENGTH)
            .and_then(|val| val.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
    }

    /// Returns the total length of the resource, even if this is a partial response.
    pub fn total_length(&self) -> Option<u64> {
        if let Some(total) = self.content_range().and_then(|cr| cr.total) {
            return Some(total);
        }
        if self.is_partial() {
            // content-length of a 206 is the length of the slice, not of the resource
            return None;
        }
        self.content_length()
    }

    /// Extracts content range value from response headers
    pub fn content_range(&self) -> Option<ContentRange> {
        self.content_range_header().and_then(|header| {
            CONTENT_RANGE_RE.captures(header).and_then(|caps| {
                let start = caps.get(1)?.as_str().parse().ok()?;
                let end = caps.get(2)?.as_str().parse().ok()?;
                let total = match caps.get(3)?.as_str() {
                    "*" => None,
                    n => n.parse().ok(),
                };
                Some(ContentRange { start, end, total })
            })
        })
    }

    /// Total length carried by a `416` answer, i.e. `Content-Range: bytes */1234`.
    pub fn unsatisfied_range_total(&self) -> Option<u64> {
        self.content_range_header().and_then(|header| {
            UNSATISFIED_RANGE_RE
                .captures(header)
                .and_then(|caps| caps.get(1)?.as_str().parse().ok())
        })
    }

    /// Checks whether server indicates that it accepts ranges
    pub fn accepts_ranges(&self) -> bool {
        self.response_headers
            .get(ACCEPT_RANGES)
            .and_then(|v| v.to_str().ok())
            .map(|s| !s.eq_ignore_ascii_case("none"))
            .unwrap_or(false)
    }

    fn content_range_header(&self) -> Option<&str> {
        self.response_headers
            .get(CONTENT_RANGE)
            .and_then(|val| val.to_str().ok())
            .map(str::trim)
    }
}

impl From<&Response> for ResponseInfo {
    fn from(value: &Response) -> Self {
        Self {
            status: value.status(),
            request_url: value.url().to_owned(),
            response_headers: value.headers().to_owned(),
        }
    }
}

static CONTENT_RANGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^bytes (\d+)-(\d+)/(\d+|\*)$").unwrap());

static UNSATISFIED_RANGE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^bytes \*/(\d+)$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub start: u64,
    pub end: u64,
    pub total: Option<u64>,
}

#[cfg(test)]
mod tests {
    use reqwest::header::HeaderValue;

    use super::*;

    fn make_response_info(status: StatusCode, headers: HeaderMap) -> ResponseInfo {
        ResponseInfo::new(status, Url::parse("http://example.com/f").unwrap(), headers)
    }

    #[test]
    fn test_accepts_ranges() {
        let mut headers = HeaderMap::new();
        assert!(!make_response_info(StatusCode::OK, headers.clone()).accepts_ranges());
        headers.insert(ACCEPT_RANGES, HeaderValue::from_static("bytes"));
        assert!(make_response_info(StatusCode::OK, headers.clone()).accepts_ranges());
        headers.insert(ACCEPT_RANGES, HeaderValue::from_static("none"));
        assert!(!make_response_info(StatusCode::OK, headers).accepts_ranges());
    }

    #[test]
    fn test_content_range() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_RANGE, HeaderValue::from_static("bytes 0-499/1234"));
        let resp = make_response_info(StatusCode::PARTIAL_CONTENT, headers.clone());
        assert_eq!(
            resp.content_range(),
            Some(ContentRange {
                start: 0,
                end: 499,
                total: Some(1234)
            })
        );

        // Content-range with unknown total
        headers.insert(CONTENT_RANGE, HeaderValue::from_static("bytes 0-499/*"));
        let resp = make_response_info(StatusCode::PARTIAL_CONTENT, headers.clone());
        assert_eq!(resp.content_range().unwrap().total, None);

        headers.insert(CONTENT_RANGE, HeaderValue::from_static("invalid"));
        let resp = make_response_info(StatusCode::PARTIAL_CONTENT, headers);
        assert!(resp.content_range().is_none());
    }

    #[test]
    fn test_total_length() {
        let mut headers = HeaderMap::new();
        assert_eq!(
            make_response_info(StatusCode::OK, headers.clone()).total_length(),
            None
        );

        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("1234"));
        assert_eq!(
            make_response_info(StatusCode::OK, headers.clone()).total_length(),
            Some(1234)
        );

        // a partial response without a total does not know the resource size
        assert_eq!(
            make_response_info(StatusCode::PARTIAL_CONTENT, headers.clone()).total_length(),
            None
        );

        headers.insert(CONTENT_RANGE, HeaderValue::from_static("bytes 1000-1233/2000"));
        assert_eq!(
            make_response_info(StatusCode::PARTIAL_CONTENT, headers).total_length(),
            Some(2000)
        );
    }

    #[test]
    fn test_unsatisfied_range_total() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_RANGE, HeaderValue::from_static("bytes */4096"));
        let resp = make_response_info(StatusCode::RANGE_NOT_SATISFIABLE, headers.clone());
        assert!(resp.is_range_not_satisfiable());
        assert_eq!(resp.unsatisfied_range_total(), Some(4096));
        assert!(resp.content_range().is_none());

        headers.insert(CONTENT_RANGE, HeaderValue::from_static("bytes 0-1/4096"));
        let resp = make_response_info(StatusCode::RANGE_NOT_SATISFIABLE, headers);
        assert_eq!(resp.unsatisfied_range_total(), None);
    }
}
