use bytes::Bytes;

/// Request body buffer.
///
/// Cheap to clone: the default uploader reads the same backing bytes the
/// builder captured, no copy is made at submission.
#[derive(Debug, Clone, Default)]
pub struct Content {
    data: Bytes,
}

impl Content {
    /// Wraps a byte buffer.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Content { data: data.into() }
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the body is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// The body as UTF-8 text, if valid.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.data).ok()
    }

    /// Consumes the buffer.
    pub fn into_bytes(self) -> Bytes {
        self.data
    }
}

impl From<&str> for Content {
    fn from(data: &str) -> Self {
        Content::new(data.as_bytes().to_vec())
    }
}

impl From<String> for Content {
    fn from(data: String) -> Self {
        Content::new(data.into_bytes())
    }
}

impl From<&[u8]> for Content {
    fn from(data: &[u8]) -> Self {
        Content::new(data.to_vec())
    }
}

impl From<Vec<u8>> for Content {
    fn from(data: Vec<u8>) -> Self {
        Content::new(data)
    }
}

impl From<Bytes> for Content {
    fn from(data: Bytes) -> Self {
        Content { data }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions_preserve_bytes() {
        assert_eq!(Content::from("abc").as_bytes(), b"abc");
        assert_eq!(Content::from(String::from("xy")).len(), 2);
        assert_eq!(Content::from(vec![1u8, 2, 3]).as_bytes(), &[1, 2, 3]);
        assert!(Content::default().is_empty());
    }

    #[test]
    fn text_view() {
        assert_eq!(Content::from("héllo").as_str(), Some("héllo"));
        assert_eq!(Content::from(vec![0xffu8, 0xfe]).as_str(), None);
    }
}
