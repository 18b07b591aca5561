//! Remote URL parsing.
//!
//! Accepts the URL forms git users type: `https://` / `http://`,
//! `ssh://[user@]host[:port]/path`, and scp-like `[user@]host:path`.

use std::fmt;

use url::Url;

/// Default SSH port.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// A parsed remote location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteUrl {
    /// Smart HTTP(S) remote. `url` has no userinfo and no trailing slash.
    Http { url: String, host: String },

    /// SSH remote.
    Ssh {
        user: String,
        host: String,
        port: u16,
        path: String,
    },
}

impl RemoteUrl {
    /// The host identity used to scope credentials and prompt answers.
    pub fn host(&self) -> &str {
        match self {
            RemoteUrl::Http { host, .. } | RemoteUrl::Ssh { host, .. } => host,
        }
    }

    /// Returns a human-readable scheme name.
    pub fn scheme(&self) -> &'static str {
        match self {
            RemoteUrl::Http { url, .. } if url.starts_with("http://") => "http",
            RemoteUrl::Http { .. } => "https",
            RemoteUrl::Ssh { .. } => "ssh",
        }
    }
}

impl fmt::Display for RemoteUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteUrl::Http { url, .. } => f.write_str(url),
            RemoteUrl::Ssh {
                user,
                host,
                port,
                path,
            } => {
                let user_part = if user.is_empty() {
                    String::new()
                } else {
                    format!("{}@", user)
                };
                if *port == DEFAULT_SSH_PORT {
                    write!(f, "ssh://{}{}{}", user_part, host, path)
                } else {
                    write!(f, "ssh://{}{}:{}{}", user_part, host, port, path)
                }
            }
        }
    }
}

/// Parse a remote URL. Returns `None` for anything that is not a URL we can
/// talk to, which callers treat as a remote name.
pub fn parse_remote_url(input: &str) -> Option<RemoteUrl> {
    if input.contains("://") {
        let url = Url::parse(input).ok()?;
        let host = url.host_str().filter(|h| !h.is_empty())?.to_string();
        return match url.scheme() {
            "https" | "http" => Some(parse_http_url(url, host)),
            "ssh" | "git+ssh" | "ssh+git" => Some(RemoteUrl::Ssh {
                user: url.username().to_string(),
                host,
                port: url.port().unwrap_or(DEFAULT_SSH_PORT),
                path: url.path().to_string(),
            }),
            _ => None,
        };
    }

    parse_scp_like(input)
}

fn parse_http_url(mut url: Url, host: String) -> RemoteUrl {
    // Credentials never travel inside the URL; they come from the protocol.
    let _ = url.set_username("");
    let _ = url.set_password(None);
    let text = url.as_str().trim_end_matches('/').to_string();
    RemoteUrl::Http { url: text, host }
}

/// Parse `[user@]host:path`.
fn parse_scp_like(input: &str) -> Option<RemoteUrl> {
    let colon = input.find(':')?;
    let (authority, path) = (&input[..colon], &input[colon + 1..]);

    // Local paths: `C:\repo`, `./a:b`, `/a:b`.
    if authority.len() <= 1 || authority.contains('/') || authority.contains('\\') {
        return None;
    }
    if path.is_empty() {
        return None;
    }

    let (user, host) = match authority.rsplit_once('@') {
        Some((user, host)) => (user.to_string(), host.to_string()),
        None => (String::new(), authority.to_string()),
    };
    if host.is_empty() {
        return None;
    }

    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };

    Some(RemoteUrl::Ssh {
        user,
        host,
        port: DEFAULT_SSH_PORT,
        path,
    })
}
