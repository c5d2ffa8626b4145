//! The body of a "complete multipart upload" request.

use std::fmt::Write;

use bytes::Bytes;

const XML_NAMESPACE: &str = "http://s3.amazonaws.com/doc/2006-03-01/";

/// A part that was uploaded and acknowledged by the store.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CompletedPart {
    /// The 1-based part number.
    pub number: u32,
    /// The ETag returned for the part, verbatim.
    pub etag: String,
}

/// The ordered list of parts that make up the final object.
#[derive(Clone, Debug, Default)]
pub struct CompletionManifest {
    parts: Vec<CompletedPart>,
}

impl CompletionManifest {
    /// Creates a manifest from parts, sorting them by part number.
    pub fn new(mut parts: Vec<CompletedPart>) -> Self {
        parts.sort_by_key(|part| part.number);
        Self { parts }
    }

    /// The parts in ascending part number order.
    pub fn parts(&self) -> &[CompletedPart] {
        &self.parts
    }

    /// Renders the manifest as an XML document.
    pub fn to_xml(&self) -> String {
        let mut xml = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <CompleteMultipartUpload xmlns=\"{XML_NAMESPACE}\">\n"
        );
        for part in &self.parts {
            // writing into a String cannot fail
            let _ = write!(
                xml,
                "<Part><ETag>{}</ETag><PartNumber>{}</PartNumber></Part>",
                escape(&part.etag),
                part.number
            );
        }
        xml.push_str("</CompleteMultipartUpload>");
        xml
    }

    /// The XML document as a request body.
    pub fn to_body(&self) -> Bytes {
        Bytes::from(self.to_xml())
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_parts_in_order() {
        let manifest = CompletionManifest::new(vec![
            CompletedPart {
                number: 2,
                etag: "b".into(),
            },
            CompletedPart {
                number: 1,
                etag: "a".into(),
            },
        ]);

        let xml = manifest.to_xml();
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<CompleteMultipartUpload"));
        assert!(xml.ends_with(
            "<Part><ETag>a</ETag><PartNumber>1</PartNumber></Part>\
             <Part><ETag>b</ETag><PartNumber>2</PartNumber></Part>\
             </CompleteMultipartUpload>"
        ));
    }

    #[test]
    fn escapes_quoted_etags() {
        let manifest = CompletionManifest::new(vec![CompletedPart {
            number: 1,
            etag: "\"abc\"".into(),
        }]);
        assert!(manifest.to_xml().contains("<ETag>&quot;abc&quot;</ETag>"));
    }
}
