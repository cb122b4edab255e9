use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("XML syntax error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("document has no root element")]
    EmptyDocument,
    #[error("unclosed element <{0}> at end of document")]
    UnclosedElement(String),
    #[error("missing required element: {element}")]
    MissingElement { element: &'static str },
}

impl ParseError {
    /// Structural errors mean the document was well-formed but lacked a
    /// construct the model cannot do without.
    pub fn is_structural(&self) -> bool {
        matches!(self, ParseError::MissingElement { .. })
    }
}

pub(crate) fn read_source(path: &std::path::Path) -> Result<String, ParseError> {
    std::fs::read_to_string(path).map_err(|source| ParseError::Io {
        path: path.to_path_buf(),
        source,
    })
}
