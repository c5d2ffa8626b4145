//! Pulling fields out of store responses.

use regex::Regex;

use crate::store::HeaderMap;

/// Returns the text of the first `<name>` element in `xml`, ignoring case and namespaces.
pub fn xml_tag(xml: &str, name: &str) -> Option<String> {
    let name = regex::escape(name);
    let pattern = Regex::new(&format!(r"(?is)<(?:\w+:)?{name}(?:\s[^>]*)?>(.*?)</(?:\w+:)?{name}>"))
        .ok()?;
    let text = pattern.captures(xml)?.get(1)?.as_str().trim();
    (!text.is_empty()).then(|| text.to_owned())
}

/// The `ETag` response header, if present and not empty.
pub fn etag_header(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(reqwest::header::ETAG)?.to_str().ok()?.trim();
    (!value.is_empty()).then(|| value.to_owned())
}

/// Removes surrounding quotes, literal or entity-encoded, from an ETag.
pub fn unquote_etag(etag: &str) -> &str {
    let etag = etag.trim();
    for quote in ["\"", "&quot;", "&#34;"] {
        if let Some(inner) = etag.strip_prefix(quote).and_then(|e| e.strip_suffix(quote)) {
            return inner;
        }
    }
    etag
}

#[cfg(test)]
mod tests {
    use reqwest::header::HeaderValue;

    use super::*;

    #[test]
    fn extracts_upload_id() {
        let body = r#"<?xml version="1.0" encoding="UTF-8"?>
<InitiateMultipartUploadResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Bucket>bench</Bucket>
  <Key>data.bin</Key>
  <UploadId>VXBsb2FkIElE</UploadId>
</InitiateMultipartUploadResult>"#;
        assert_eq!(xml_tag(body, "UploadId").as_deref(), Some("VXBsb2FkIElE"));
        assert_eq!(xml_tag(body, "uploadid").as_deref(), Some("VXBsb2FkIElE"));
        assert_eq!(xml_tag(body, "Code"), None);
    }

    #[test]
    fn extracts_error_code() {
        let body = "<Error><Code>NoSuchBucket</Code><Message>missing</Message></Error>";
        assert_eq!(xml_tag(body, "Code").as_deref(), Some("NoSuchBucket"));
    }

    #[test]
    fn empty_tag_is_missing() {
        assert_eq!(xml_tag("<ETag></ETag>", "ETag"), None);
    }

    #[test]
    fn reads_etag_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(etag_header(&headers), None);

        headers.insert("etag", HeaderValue::from_static("\"abc\""));
        assert_eq!(etag_header(&headers).as_deref(), Some("\"abc\""));
    }

    #[test]
    fn unquotes_etags() {
        assert_eq!(unquote_etag("\"abc\""), "abc");
        assert_eq!(unquote_etag("&quot;abc-3&quot;"), "abc-3");
        assert_eq!(unquote_etag("abc"), "abc");
    }
}
