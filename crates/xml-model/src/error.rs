//! Error types for the XML input model

/// Result type for XML model operations
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for parsing, tree access and serialization
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// XML parsing failed
    #[error("XML parsing error: {0}")]
    XmlParse(String),

    /// A prefixed name used a prefix with no namespace declaration in scope
    #[error("Unbound namespace prefix '{0}'")]
    UnboundPrefix(String),

    /// Serializing content events failed
    #[error("XML serialization error: {0}")]
    Serialize(String),

    /// Node access error
    #[error("Node access error: {0}")]
    NodeAccess(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a new XML parsing error
    pub fn xml_parse<S: Into<String>>(msg: S) -> Self {
        Error::XmlParse(msg.into())
    }

    /// Create a new serialization error
    pub fn serialize<S: Into<String>>(msg: S) -> Self {
        Error::Serialize(msg.into())
    }

    /// Create a new node access error
    pub fn node_access<S: Into<String>>(msg: S) -> Self {
        Error::NodeAccess(msg.into())
    }
}
