//! Network transports that perform the authenticated ref-discovery phase of
//! fetch, pull and push, and the failure type they raise.
//!
//! Transports never talk to the user directly: every piece of input they
//! need goes through the `CredentialProtocol` they are handed.

pub mod http;
pub mod pktline;
pub mod remote;
pub mod ssh;
pub mod url;

use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::error::GitwardError;
use crate::protocol::CredentialProtocol;

pub use self::url::RemoteUrl;

/// Broad layer a transport failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The host could not be reached or the connection broke.
    Network,
    /// The server refused the credentials or authentication could not proceed.
    Authentication,
    /// The server answered but there is no repository at that path.
    NoRemoteRepository,
    /// The server spoke, but not the git protocol we expected.
    Protocol,
    /// Local configuration is missing (e.g. no URL for a remote name).
    Configuration,
}

impl TransportErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportErrorKind::Network => "TransportException",
            TransportErrorKind::Authentication => "AuthenticationException",
            TransportErrorKind::NoRemoteRepository => "NoRemoteRepositoryException",
            TransportErrorKind::Protocol => "ProtocolException",
            TransportErrorKind::Configuration => "ConfigurationException",
        }
    }
}

/// SSH disconnect reason codes (RFC 4253 section 11.1).
#[allow(dead_code)] // full reason table; the SSH transport raises a subset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectCode {
    HostNotAllowedToConnect = 1,
    ProtocolError = 2,
    KeyExchangeFailed = 3,
    MacError = 5,
    ServiceNotAvailable = 7,
    HostKeyNotVerifiable = 9,
    ConnectionLost = 10,
    ByApplication = 11,
    TooManyConnections = 12,
    AuthCancelledByUser = 13,
    NoMoreAuthMethodsAvailable = 14,
    IllegalUserName = 15,
}

impl DisconnectCode {
    pub fn description(&self) -> &'static str {
        match self {
            DisconnectCode::HostNotAllowedToConnect => "host not allowed to connect",
            DisconnectCode::ProtocolError => "protocol error",
            DisconnectCode::KeyExchangeFailed => "key exchange failed",
            DisconnectCode::MacError => "MAC error",
            DisconnectCode::ServiceNotAvailable => "service not available",
            DisconnectCode::HostKeyNotVerifiable => "host key not verifiable",
            DisconnectCode::ConnectionLost => "connection lost",
            DisconnectCode::ByApplication => "disconnected by application",
            DisconnectCode::TooManyConnections => "too many connections",
            DisconnectCode::AuthCancelledByUser => "auth cancelled by user",
            DisconnectCode::NoMoreAuthMethodsAvailable => "no more authentication methods available",
            DisconnectCode::IllegalUserName => "illegal user name",
        }
    }
}

/// A failure raised by a transport.
///
/// Carries a message, the layer it came from, the remote it concerns, an
/// optional SSH disconnect code, and an optional cause that forms the chain
/// the classifier walks. The remote is kept out of `message` so that URL
/// text never reaches the classifier's markers.
#[derive(Error, Debug)]
#[error("{}", located(.remote, .message))]
pub struct TransportError {
    kind: TransportErrorKind,
    message: String,
    remote: Option<String>,
    disconnect: Option<DisconnectCode>,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            remote: None,
            disconnect: None,
            source: None,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Network, message)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Authentication, message)
    }

    pub fn no_remote_repository(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::NoRemoteRepository, message)
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Protocol, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Configuration, message)
    }

    /// Name the remote (URL, `user@host` or remote name) the failure concerns.
    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = Some(remote.into());
        self
    }

    pub fn with_disconnect(mut self, code: DisconnectCode) -> Self {
        self.disconnect = Some(code);
        self
    }

    pub fn caused_by(mut self, cause: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(cause));
        self
    }

    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    /// The failure text without the remote prefix.
    pub fn message(&self) -> &str {
        &self.message
    }

    #[cfg(test)]
    pub fn remote(&self) -> Option<&str> {
        self.remote.as_deref()
    }

    pub fn disconnect(&self) -> Option<DisconnectCode> {
        self.disconnect
    }
}

fn located(remote: &Option<String>, message: &str) -> String {
    match remote {
        Some(remote) => format!("{}: {}", remote, message),
        None => message.to_string(),
    }
}

/// Which git service a discovery request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    /// Used by fetch and pull.
    UploadPack,
    /// Used by push.
    ReceivePack,
}

impl Service {
    pub fn as_str(&self) -> &'static str {
        match self {
            Service::UploadPack => "git-upload-pack",
            Service::ReceivePack => "git-receive-pack",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A ref advertised by the remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRef {
    pub oid: String,
    pub name: String,
}

/// Settings shared by all transports.
#[derive(Debug, Clone)]
pub struct TransportOptions {
    pub timeout: Duration,
    pub identity_files: Vec<std::path::PathBuf>,
}

/// Performs ref discovery for a remote URL.
pub trait Transport {
    fn list_refs(
        &self,
        url: &RemoteUrl,
        service: Service,
        protocol: &mut CredentialProtocol,
    ) -> Result<Vec<RemoteRef>, GitwardError>;
}

/// Pick the transport for a URL's scheme and run discovery.
pub fn list_refs(
    url: &RemoteUrl,
    service: Service,
    protocol: &mut CredentialProtocol,
    options: &TransportOptions,
) -> Result<Vec<RemoteRef>, GitwardError> {
    match url {
        RemoteUrl::Http { .. } => http::HttpTransport::new(options, url)?.list_refs(url, service, protocol),
        RemoteUrl::Ssh { .. } => ssh::SshTransport::new(options).list_refs(url, service, protocol),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("connection reset by peer")]
    struct Reset;

    #[test]
    fn error_chain_is_exposed_through_source() {
        let err = TransportError::network("fetch failed").caused_by(
            TransportError::authentication("Auth fail")
                .with_disconnect(DisconnectCode::NoMoreAuthMethodsAvailable)
                .caused_by(Reset),
        );
        let chain: Vec<String> = std::iter::successors(
            Some(&err as &(dyn StdError + 'static)),
            |e| (*e).source(),
        )
        .map(|e| e.to_string())
        .collect();
        assert_eq!(chain, vec!["fetch failed", "Auth fail", "connection reset by peer"]);
    }

    #[test]
    fn remote_is_shown_but_kept_out_of_message() {
        let err = TransportError::authentication("not authorized")
            .with_remote("https://git.example.com/authorization.git");
        assert_eq!(
            err.to_string(),
            "https://git.example.com/authorization.git: not authorized"
        );
        assert_eq!(err.message(), "not authorized");
        assert_eq!(err.remote(), Some("https://git.example.com/authorization.git"));
        assert_eq!(TransportError::network("boom").to_string(), "boom");
    }

    #[test]
    fn service_names() {
        assert_eq!(Service::UploadPack.to_string(), "git-upload-pack");
        assert_eq!(Service::ReceivePack.as_str(), "git-receive-pack");
    }

    #[test]
    fn disconnect_description() {
        assert_eq!(
            DisconnectCode::NoMoreAuthMethodsAvailable.description(),
            "no more authentication methods available"
        );
        assert_eq!(DisconnectCode::NoMoreAuthMethodsAvailable as u8, 14);
    }
}
