use crate::bundle::types::{BundleElement, BundleMetadata, SizedBundleElement};
use crate::error::{invalid_argument, DocSyncResult};

/// Reads a bundle's length-prefixed JSON element stream.
///
/// Each element is encoded as the decimal byte length of its JSON body
/// followed immediately by the body itself. The first element must be the
/// bundle metadata header.
pub struct BundleReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> BundleReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Reads and validates the metadata header; must be called first.
    pub fn read_metadata(&mut self) -> DocSyncResult<BundleMetadata> {
        match self.next_element()? {
            Some(SizedBundleElement {
                element: BundleElement::Metadata(metadata),
                ..
            }) => Ok(metadata),
            Some(_) => Err(invalid_argument(
                "Bundle must begin with a metadata element",
            )),
            None => Err(invalid_argument("Bundle is empty")),
        }
    }

    /// Next element in the stream, or `None` at the end of the bundle.
    pub fn next_element(&mut self) -> DocSyncResult<Option<SizedBundleElement>> {
        if self.position >= self.data.len() {
            return Ok(None);
        }

        let length_start = self.position;
        while self.position < self.data.len() && self.data[self.position].is_ascii_digit() {
            self.position += 1;
        }
        if self.position == length_start {
            return Err(invalid_argument(
                "Malformed bundle: expected a length prefix",
            ));
        }
        let length_text = std::str::from_utf8(&self.data[length_start..self.position])
            .expect("ASCII digits are valid UTF-8");
        let body_length: usize = length_text
            .parse()
            .map_err(|err| invalid_argument(format!("Malformed bundle length prefix: {err}")))?;

        let body_start = self.position;
        let body_end = body_start
            .checked_add(body_length)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| invalid_argument("Bundle element is truncated"))?;
        self.position = body_end;

        let element: BundleElement = serde_json::from_slice(&self.data[body_start..body_end])
            .map_err(|err| invalid_argument(format!("Malformed bundle element: {err}")))?;
        Ok(Some(SizedBundleElement {
            element,
            byte_length: self.position - length_start,
        }))
    }
}

/// Encodes elements in the reader's wire format; fixture and test support.
pub fn encode_bundle(elements: &[BundleElement]) -> Vec<u8> {
    let mut out = Vec::new();
    for element in elements {
        let body = serde_json::to_vec(element).expect("bundle elements serialize");
        out.extend_from_slice(body.len().to_string().as_bytes());
        out.extend_from_slice(&body);
    }
    out
}
