const UTF8: &str = "UTF-8";

/// Configuration for rendering a finished document.
///
/// Signed documents are never re-indented: whitespace inside the Body and Timestamp is covered
/// by their digests.
#[derive(Debug, Clone)]
pub struct XmlConfig {
    pub xml_decl: bool,
    pub encoding: String,
}

impl Default for XmlConfig {
    fn default() -> Self {
        Self {
            xml_decl: true,
            encoding: UTF8.to_string(),
        }
    }
}

impl XmlConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set this flag to true to include the XML declaration. Default is true.
    pub fn xml_decl(mut self, decl: bool) -> Self {
        self.xml_decl = decl;
        self
    }

    /// Encoding label written into the XML declaration. Default is "UTF-8".
    pub fn encoding<S: ToString>(mut self, encoding: S) -> Self {
        self.encoding = encoding.to_string();
        self
    }
}
