use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum CrawlError {
    #[error("invalid humId: {0}")]
    #[diagnostic(help("humIds look like hum0001"))]
    InvalidHumId(String),

    #[error("invalid humVersionId: {0}")]
    #[diagnostic(help("humVersionIds look like hum0001-v1"))]
    InvalidHumVersionId(String),

    #[error("invalid language: {0}")]
    InvalidLang(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid header mapping table: {0}")]
    MappingTable(String),

    #[error("failed to build HTTP client: {0}")]
    #[diagnostic(help("check the timeoutSecs setting and the TLS setup"))]
    HttpClient(String),

    #[error("portal request failed for {url}: {message}")]
    PortalHttp { url: String, message: String },

    #[error("portal returned status {status} for {url}")]
    PortalStatus { status: u16, url: String },

    #[error("{registry} request failed: {message}")]
    RegistryHttp { registry: String, message: String },

    #[error("{registry} returned status {status}: {message}")]
    RegistryStatus {
        registry: String,
        status: u16,
        message: String,
    },

    #[error("Crossref request failed: {0}")]
    CrossrefHttp(String),

    #[error("Crossref returned status {status}: {message}")]
    CrossrefStatus { status: u16, message: String },

    #[error("failed to parse {page}: {message}")]
    #[diagnostic(help("the portal markup may have changed"))]
    Parse { page: String, message: String },

    #[error("{kind} record {id} failed validation: {}", violations.join("; "))]
    SchemaValidation {
        kind: String,
        id: String,
        violations: Vec<String>,
    },

    #[error("no projects found: {0}")]
    EmptyWorkList(String),

    #[error("record not found: {0}")]
    RecordNotFound(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl CrawlError {
    pub fn parse(page: impl Into<String>, message: impl Into<String>) -> Self {
        CrawlError::Parse {
            page: page.into(),
            message: message.into(),
        }
    }

    /// True for HTTP 404 responses from the portal or a registry.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CrawlError::PortalStatus { status: 404, .. }
                | CrawlError::RegistryStatus { status: 404, .. }
                | CrawlError::CrossrefStatus { status: 404, .. }
        )
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            CrawlError::PortalStatus { status, .. }
            | CrawlError::RegistryStatus { status, .. }
            | CrawlError::CrossrefStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}
