//! Smart HTTP ref discovery using reqwest::blocking.
//!
//! `GET <url>/info/refs?service=git-<service>` is tried anonymously first.
//! A 401 turns into a `[Username, Secret]` request to the credential
//! protocol and one authenticated retry. Everything else is mapped onto a
//! `TransportError` the classifier understands.

use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;

use super::pktline::parse_advertisement;
use super::{RemoteRef, RemoteUrl, Service, Transport, TransportError, TransportOptions};
use crate::error::GitwardError;
use crate::prompt::{items, Answer, Prompt, PromptItem};
use crate::protocol::CredentialProtocol;
use crate::secret::SecretBuffer;

/// Where a token goes in an HTTP Basic credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPlacement {
    /// Token as both username and password. Accepted by GitHub and most
    /// self-hosted servers.
    Both,
    /// Fixed username, token as password.
    Password { username: &'static str },
}

impl TokenPlacement {
    pub fn for_host(host: &str) -> Self {
        let host = host.to_ascii_lowercase();
        if host == "bitbucket.org" || host.ends_with(".bitbucket.org") {
            TokenPlacement::Password {
                username: "x-token-auth",
            }
        } else if host == "gitlab.com" || host.starts_with("gitlab.") {
            TokenPlacement::Password { username: "oauth2" }
        } else {
            TokenPlacement::Both
        }
    }
}

/// Basic-auth pair taken out of answered prompts. Both halves are scrubbed
/// once the request has been built.
struct WireCredentials {
    username: SecretBuffer,
    password: SecretBuffer,
}

impl WireCredentials {
    fn from_answers(host: &str, prompts: &mut [PromptItem]) -> Option<Self> {
        let [user_item, secret_item] = prompts else {
            return None;
        };
        let secret = secret_item.take_secret()?;
        match user_item.answer.take()? {
            Answer::Text(username) => Some(Self {
                username: SecretBuffer::from_string(username),
                password: secret,
            }),
            Answer::Token(mut duplicate) => {
                duplicate.clear();
                let username = match TokenPlacement::for_host(host) {
                    TokenPlacement::Both => secret.clone(),
                    TokenPlacement::Password { username } => SecretBuffer::from(username),
                };
                Some(Self {
                    username,
                    password: secret,
                })
            }
            _ => None,
        }
    }
}

pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(options: &TransportOptions, url: &RemoteUrl) -> Result<Self, GitwardError> {
        let mut builder = Client::builder()
            .timeout(options.timeout)
            .connect_timeout(options.timeout)
            .user_agent(concat!("git/2.0 (gitward/", env!("CARGO_PKG_VERSION"), ")"));
        // Loopback hosts never go through a proxy.
        if is_loopback(url.host()) {
            builder = builder.no_proxy();
        }
        let client = builder
            .build()
            .map_err(|e| {
                TransportError::network("failed to create HTTP client").caused_by(e.without_url())
            })?;
        Ok(Self { client })
    }

    fn send(
        &self,
        endpoint: &str,
        base: &str,
        credentials: Option<WireCredentials>,
    ) -> Result<Response, TransportError> {
        let mut request = self.client.get(endpoint);
        if let Some(mut creds) = credentials {
            let user = creds.username.scrub_on_exit();
            let pass = creds.password.scrub_on_exit();
            let (Some(user), Some(pass)) = (user.expose_str(), pass.expose_str()) else {
                return Err(TransportError::authentication(
                    "credentials are not valid UTF-8; not authorized",
                )
                .with_remote(base));
            };
            if base.starts_with("http://") {
                tracing::warn!(url = %base, "Sending credentials over plain HTTP");
            }
            request = request.basic_auth(user, Some(pass));
        }

        request.send().map_err(|e| {
            let reason = if e.is_timeout() {
                "timed out"
            } else if e.is_connect() {
                "could not connect"
            } else {
                "request failed"
            };
            TransportError::network(reason)
                .with_remote(base)
                .caused_by(e.without_url())
        })
    }

    /// Ask the protocol for credentials, giving it one reset in between.
    fn request_credentials(
        &self,
        host: &str,
        protocol: &mut CredentialProtocol,
    ) -> Result<Option<WireCredentials>, GitwardError> {
        let mut prompts = items([Prompt::Username, Prompt::Secret]);
        if !protocol.get(&mut prompts)? {
            protocol.reset();
            prompts = items([Prompt::Username, Prompt::Secret]);
            if !protocol.get(&mut prompts)? {
                return Ok(None);
            }
        }
        Ok(WireCredentials::from_answers(host, &mut prompts))
    }
}

impl Transport for HttpTransport {
    fn list_refs(
        &self,
        url: &RemoteUrl,
        service: Service,
        protocol: &mut CredentialProtocol,
    ) -> Result<Vec<RemoteRef>, GitwardError> {
        let RemoteUrl::Http { url: base, host } = url else {
            return Err(TransportError::configuration("not an HTTP remote")
                .with_remote(url.to_string())
                .into());
        };
        let endpoint = format!("{}/info/refs?service={}", base, service);
        tracing::debug!(url = %base, %service, "Discovering refs over HTTP");

        let mut response = self.send(&endpoint, base, None)?;
        if response.status() == StatusCode::UNAUTHORIZED {
            tracing::debug!(url = %base, "Server requires authentication");
            let Some(credentials) = self.request_credentials(host, protocol)? else {
                return Err(TransportError::authentication("not authorized")
                    .with_remote(base.as_str())
                    .into());
            };
            response = self.send(&endpoint, base, Some(credentials))?;
            if response.status() == StatusCode::UNAUTHORIZED {
                protocol.reset();
                return Err(TransportError::authentication("not authorized")
                    .with_remote(base.as_str())
                    .into());
            }
        }

        Ok(read_advertisement(response, base, service)?)
    }
}

fn is_loopback(host: &str) -> bool {
    host.eq_ignore_ascii_case("localhost")
        || host
            .trim_matches(|c| c == '[' || c == ']')
            .parse::<std::net::IpAddr>()
            .is_ok_and(|ip| ip.is_loopback())
}

fn read_advertisement(
    response: Response,
    base: &str,
    service: Service,
) -> Result<Vec<RemoteRef>, TransportError> {
    match response.status() {
        status if status.is_success() => parse_advertisement(response, service, true),
        StatusCode::FORBIDDEN => Err(TransportError::authentication(format!(
            "{} not permitted",
            service
        ))
        .with_remote(base)),
        StatusCode::NOT_FOUND => {
            Err(TransportError::no_remote_repository("no such remote repository").with_remote(base))
        }
        status => Err(
            TransportError::protocol(format!("unexpected HTTP status {}", status)).with_remote(base),
        ),
    }
}
