//! Value descriptors frozen into a request at submission.

use std::path::{Path, PathBuf};

/// Client certificate format tag understood by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertFormat {
    Pem,
    Der,
    P12,
}

impl CertFormat {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            CertFormat::Pem => "PEM",
            CertFormat::Der => "DER",
            CertFormat::P12 => "P12",
        }
    }
}

/// Client certificate presented during the TLS handshake.
#[derive(Debug, Clone)]
pub struct ClientCert {
    path: PathBuf,
    format: CertFormat,
    password: Option<String>,
}

impl ClientCert {
    /// Certificate at `path` in the given format.
    pub fn new(path: impl Into<PathBuf>, format: CertFormat) -> Self {
        ClientCert {
            path: path.into(),
            format,
            password: None,
        }
    }

    /// Password protecting the certificate's key material.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn format(&self) -> CertFormat {
        self.format
    }

    pub(crate) fn key_password(&self) -> Option<&str> {
        self.password.as_deref()
    }
}

/// Forward proxy for a request.
#[derive(Debug, Clone)]
pub struct Proxy {
    url: String,
    username: Option<String>,
    password: Option<String>,
}

impl Proxy {
    /// Proxy reachable at `url` (scheme selects the proxy protocol).
    pub fn new(url: impl Into<String>) -> Self {
        Proxy {
            url: url.into(),
            username: None,
            password: None,
        }
    }

    /// Basic credentials for the proxy.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub(crate) fn url(&self) -> &str {
        &self.url
    }

    pub(crate) fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub(crate) fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }
}
