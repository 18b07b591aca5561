//! SSH ref discovery using the ssh2 crate (libssh2 bindings).
//!
//! Connects, verifies the host key against `~/.ssh/known_hosts`, runs the
//! authentication cascade (agent -> identity files -> keyboard-interactive ->
//! password) and executes `git-upload-pack` / `git-receive-pack` to read the
//! ref advertisement.
//!
//! Every question for the user (unknown host key, key passphrase, password,
//! keyboard-interactive prompts) goes through the `CredentialProtocol`.

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine;
use ssh2::{CheckResult, HashType, KeyboardInteractivePrompt, KnownHostFileKind, Session};

use super::pktline::parse_advertisement;
use super::{
    DisconnectCode, RemoteRef, RemoteUrl, Service, Transport, TransportError, TransportOptions,
};
use crate::error::GitwardError;
use crate::prompt::{self, items, legacy, Answer, Prompt};
use crate::protocol::CredentialProtocol;

const NOT_A_REPOSITORY_MARKERS: &[&str] = &[
    "does not appear to be a git repository",
    "repository not found",
];

pub struct SshTransport {
    timeout: Duration,
    identity_files: Vec<PathBuf>,
}

impl SshTransport {
    pub fn new(options: &TransportOptions) -> Self {
        Self {
            timeout: options.timeout,
            identity_files: options.identity_files.clone(),
        }
    }

    fn connect(&self, host: &str, port: u16) -> Result<Session, TransportError> {
        let addrs: Vec<_> = (host, port)
            .to_socket_addrs()
            .map_err(|e| {
                TransportError::network("could not resolve host")
                    .with_remote(host)
                    .caused_by(e)
            })?
            .collect();

        let mut last_err = None;
        let mut tcp = None;
        for addr in &addrs {
            match TcpStream::connect_timeout(addr, self.timeout) {
                Ok(stream) => {
                    tcp = Some(stream);
                    break;
                }
                Err(e) => last_err = Some(e),
            }
        }
        let tcp = match (tcp, last_err) {
            (Some(tcp), _) => tcp,
            (None, Some(e)) => {
                return Err(TransportError::network("could not connect")
                    .with_remote(format!("{}:{}", host, port))
                    .caused_by(e))
            }
            (None, None) => {
                return Err(TransportError::network("host has no addresses").with_remote(host))
            }
        };

        let mut session = Session::new().map_err(|e| {
            TransportError::network("failed to create SSH session").caused_by(e)
        })?;
        session.set_timeout(u32::try_from(self.timeout.as_millis()).unwrap_or(u32::MAX));
        session.set_tcp_stream(tcp);
        session.handshake().map_err(|e| {
            TransportError::network("SSH handshake failed")
                .with_remote(host)
                .caused_by(e)
        })?;
        Ok(session)
    }

    fn authenticate(
        &self,
        session: &Session,
        user: &str,
        host: &str,
        protocol: &mut CredentialProtocol,
    ) -> Result<(), GitwardError> {
        if session.userauth_agent(user).is_ok() && session.authenticated() {
            tracing::debug!(%user, %host, "Authenticated via SSH agent");
            return Ok(());
        }

        let methods = session
            .auth_methods(user)
            .map(str::to_string)
            .unwrap_or_else(|_| "publickey,keyboard-interactive,password".to_string());
        tracing::debug!(%user, %host, %methods, "Server authentication methods");

        let auth_fail = || {
            let code = DisconnectCode::NoMoreAuthMethodsAvailable;
            tracing::debug!(%user, %host, reason = code.description(), "SSH authentication exhausted");
            TransportError::authentication("Auth fail")
                .with_remote(format!("{}@{}", user, host))
                .with_disconnect(code)
        };

        if methods.contains("publickey") && self.try_identity_files(session, user, protocol)? {
            return Ok(());
        }
        // A declined key passphrase ends the cascade; no password fallback.
        if protocol.passphrase_declined() {
            return Err(auth_fail().into());
        }

        if methods.contains("keyboard-interactive") {
            let mut prompter = ProtocolPrompter {
                protocol: &mut *protocol,
                failure: None,
            };
            let accepted = session
                .userauth_keyboard_interactive(user, &mut prompter)
                .is_ok()
                && session.authenticated();
            if let Some(err) = prompter.failure {
                return Err(err);
            }
            if accepted {
                tracing::debug!(%user, %host, "Authenticated via keyboard-interactive");
                return Ok(());
            }
        }

        if methods.contains("password") {
            return self.try_password(session, user, host, protocol);
        }

        Err(auth_fail().into())
    }

    fn try_identity_files(
        &self,
        session: &Session,
        user: &str,
        protocol: &mut CredentialProtocol,
    ) -> Result<bool, GitwardError> {
        for key in self.identity_files.iter().filter(|p| p.is_file()) {
            if !key_is_encrypted(key) {
                if session.userauth_pubkey_file(user, None, key, None).is_ok()
                    && session.authenticated()
                {
                    tracing::debug!(key = %key.display(), "Authenticated via key file");
                    return Ok(true);
                }
                continue;
            }

            let mut prompts = items([Prompt::passphrase(format!(
                "Passphrase for {}",
                key.display()
            ))]);
            if !protocol.get(&mut prompts)? {
                tracing::debug!(key = %key.display(), "No passphrase for encrypted key");
                continue;
            }
            let Some(mut passphrase) = prompts[0].take_secret() else {
                continue;
            };
            let guard = passphrase.scrub_on_exit();
            let accepted = session
                .userauth_pubkey_file(user, None, key, guard.expose_str())
                .is_ok()
                && session.authenticated();
            drop(guard);
            if accepted {
                tracing::debug!(key = %key.display(), "Authenticated via encrypted key file");
                return Ok(true);
            }
            // Wrong passphrase or key not authorized: ask again next time.
            protocol.forget_passphrase();
        }
        Ok(false)
    }

    fn try_password(
        &self,
        session: &Session,
        user: &str,
        host: &str,
        protocol: &mut CredentialProtocol,
    ) -> Result<(), GitwardError> {
        let not_authorized = || {
            TransportError::authentication("not authorized").with_remote(format!("{}@{}", user, host))
        };

        let mut prompts = items([Prompt::Secret]);
        if !protocol.get(&mut prompts)? {
            protocol.reset();
            prompts = items([Prompt::Secret]);
            if !protocol.get(&mut prompts)? {
                return Err(not_authorized().into());
            }
        }
        let Some(mut secret) = prompts[0].take_secret() else {
            return Err(not_authorized().into());
        };
        let guard = secret.scrub_on_exit();
        let accepted = match guard.expose_str() {
            Some(password) => {
                session.userauth_password(user, password).is_ok() && session.authenticated()
            }
            None => false,
        };
        drop(guard);

        if accepted {
            tracing::debug!(%user, %host, "Authenticated via password");
            return Ok(());
        }
        protocol.reset();
        Err(not_authorized().into())
    }
}

impl Transport for SshTransport {
    fn list_refs(
        &self,
        url: &RemoteUrl,
        service: Service,
        protocol: &mut CredentialProtocol,
    ) -> Result<Vec<RemoteRef>, GitwardError> {
        let RemoteUrl::Ssh {
            user,
            host,
            port,
            path,
        } = url
        else {
            return Err(TransportError::configuration("not an SSH remote")
                .with_remote(url.to_string())
                .into());
        };
        tracing::debug!(%host, port, %service, "Discovering refs over SSH");

        let session = self.connect(host, *port)?;
        verify_host_key(&session, host, *port, protocol)?;

        let user = effective_user(user, protocol)?;
        self.authenticate(&session, &user, host, protocol)?;

        Ok(exec_service(&session, host, path, service)?)
    }
}

/// Feeds keyboard-interactive prompts through the credential protocol.
struct ProtocolPrompter<'p> {
    protocol: &'p mut CredentialProtocol,
    failure: Option<GitwardError>,
}

impl KeyboardInteractivePrompt for ProtocolPrompter<'_> {
    fn prompt<'a>(
        &mut self,
        _username: &str,
        _instructions: &str,
        prompts: &[ssh2::Prompt<'a>],
    ) -> Vec<String> {
        let blank = || vec![String::new(); prompts.len()];
        if prompts.is_empty() || self.failure.is_some() {
            return blank();
        }

        let mut answered =
            prompt::items(prompts.iter().map(|p| legacy::translate(&p.text, p.echo)));
        match self.protocol.get(&mut answered) {
            Ok(true) => answered
                .iter_mut()
                .map(|item| match item.answer.take() {
                    Some(Answer::Text(text)) => text,
                    Some(Answer::Secret(secret)) | Some(Answer::Token(secret)) => {
                        secret.expose_str().map(str::to_string).unwrap_or_default()
                    }
                    Some(Answer::Flag(flag)) => (if flag { "yes" } else { "no" }).to_string(),
                    None => String::new(),
                })
                .collect(),
            Ok(false) => blank(),
            Err(err) => {
                self.failure = Some(err);
                blank()
            }
        }
    }
}

/// URL user, else the username held for the host, else the local user.
fn effective_user(url_user: &str, protocol: &CredentialProtocol) -> Result<String, GitwardError> {
    if !url_user.is_empty() {
        return Ok(url_user.to_string());
    }
    if let Some(user) = protocol.credentials().username().filter(|u| !u.is_empty()) {
        return Ok(user.to_string());
    }
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .map_err(|_| {
            TransportError::configuration(
                "cannot determine SSH user: put it in the URL (ssh://user@host/path)",
            )
            .into()
        })
}

fn known_hosts_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".ssh").join("known_hosts"))
}

/// Check the server key against known_hosts. An unknown key is a yes/no
/// question through the protocol; a changed key is refused.
fn verify_host_key(
    session: &Session,
    host: &str,
    port: u16,
    protocol: &mut CredentialProtocol,
) -> Result<(), GitwardError> {
    let (key, key_type) = session.host_key().ok_or_else(|| {
        TransportError::network("server did not provide a host key").with_remote(host)
    })?;
    let mut known_hosts = session.known_hosts().map_err(|e| {
        TransportError::network("failed to initialise known hosts").caused_by(e)
    })?;
    let path = known_hosts_path();
    if let Some(path) = &path {
        // Missing file is normal for new users; check() reports NotFound.
        let _ = known_hosts.read_file(path, KnownHostFileKind::OpenSSH);
    }

    let fingerprint = fingerprint(session);
    match known_hosts.check_port(host, port, key) {
        CheckResult::Match => {
            tracing::debug!(%host, port, "Host key verified");
            Ok(())
        }
        CheckResult::Mismatch => {
            tracing::warn!(%host, %fingerprint, "Host key changed");
            Err(TransportError::network(format!(
                "remote host identification has changed ({}); refusing to connect",
                fingerprint
            ))
            .with_remote(host)
            .into())
        }
        CheckResult::NotFound | CheckResult::Failure => {
            let text = host_key_question(host, &format!("{:?}", key_type), &fingerprint);
            let mut prompts = items([Prompt::yes_no(text)]);
            if !protocol.get(&mut prompts)? {
                return Err(TransportError::network("host key verification failed")
                    .with_remote(host)
                    .into());
            }

            let entry = if port == super::url::DEFAULT_SSH_PORT {
                host.to_string()
            } else {
                format!("[{}]:{}", host, port)
            };
            if let Err(e) = known_hosts.add(&entry, key, host, key_type.into()) {
                tracing::warn!(%host, "Could not add host key: {}", e);
                return Ok(());
            }
            if let Some(path) = &path {
                if let Some(parent) = path.parent() {
                    let _ = std::fs::create_dir_all(parent);
                }
                match known_hosts.write_file(path, KnownHostFileKind::OpenSSH) {
                    Ok(()) => tracing::info!(%host, "Added host key to {}", path.display()),
                    Err(e) => tracing::warn!(%host, "Could not write {}: {}", path.display(), e),
                }
            }
            Ok(())
        }
    }
}

fn host_key_question(host: &str, key_type: &str, fingerprint: &str) -> String {
    format!(
        "The authenticity of host '{}' can't be established.\n\
         {} key fingerprint is {}.\n\
         Are you sure you want to continue connecting (yes/no)?",
        host, key_type, fingerprint
    )
}

/// OpenSSH-style `SHA256:<base64 without padding>`.
fn fingerprint(session: &Session) -> String {
    match session.host_key_hash(HashType::Sha256) {
        Some(hash) => format_sha256(hash),
        None => "(fingerprint unavailable)".to_string(),
    }
}

fn format_sha256(hash: &[u8]) -> String {
    format!("SHA256:{}", STANDARD_NO_PAD.encode(hash))
}

/// Whether a private key file needs a passphrase.
///
/// Handles legacy PEM (`Proc-Type: 4,ENCRYPTED`, `ENCRYPTED PRIVATE KEY`)
/// and the `openssh-key-v1` format, whose cipher name is `none` for
/// unencrypted keys.
fn key_is_encrypted(path: &Path) -> bool {
    let Ok(contents) = std::fs::read_to_string(path) else {
        return false;
    };
    if contents.contains("ENCRYPTED") {
        return true;
    }
    if !contents.contains("BEGIN OPENSSH PRIVATE KEY") {
        return false;
    }

    let body: String = contents
        .lines()
        .filter(|l| !l.starts_with("-----"))
        .map(str::trim)
        .collect();
    let Ok(raw) = STANDARD.decode(body) else {
        return false;
    };
    let Some(rest) = raw.strip_prefix(b"openssh-key-v1\0") else {
        return false;
    };
    let Some((len, rest)) = rest.split_first_chunk::<4>() else {
        return false;
    };
    let len = u32::from_be_bytes(*len) as usize;
    rest.get(..len).is_some_and(|cipher| cipher != b"none")
}

fn shell_quote(path: &str) -> String {
    format!("'{}'", path.replace('\'', "'\\''"))
}

fn exec_service(
    session: &Session,
    host: &str,
    path: &str,
    service: Service,
) -> Result<Vec<RemoteRef>, TransportError> {
    let command = format!("{} {}", service, shell_quote(path));
    let open_failed = |e: ssh2::Error| {
        TransportError::network(format!("{} failed to start", service))
            .with_remote(host)
            .caused_by(e)
    };
    let mut channel = session.channel_session().map_err(open_failed)?;
    channel.exec(&command).map_err(open_failed)?;
    tracing::debug!(%host, %command, "Executing remote service");

    let parsed = parse_advertisement(&mut channel, service, false);

    // End the conversation: we only wanted the advertisement.
    let _ = channel.write_all(b"0000");
    let _ = channel.send_eof();

    match parsed {
        Ok(refs) => {
            let _ = channel.wait_close();
            Ok(refs)
        }
        Err(err) => {
            let mut stderr = String::new();
            let _ = channel.stderr().read_to_string(&mut stderr);
            let _ = channel.wait_close();
            Err(exec_failure(host, path, service, &stderr, err))
        }
    }
}

/// Turn a failed exec into the failure the classifier expects.
fn exec_failure(
    host: &str,
    path: &str,
    service: Service,
    stderr: &str,
    parse_error: TransportError,
) -> TransportError {
    let stderr = stderr.trim();
    let lowered = stderr.to_lowercase();
    if NOT_A_REPOSITORY_MARKERS.iter().any(|m| lowered.contains(m)) {
        return TransportError::no_remote_repository("no such remote repository")
            .with_remote(format!("{}:{}", host, path))
            .caused_by(parse_error);
    }
    if stderr.is_empty() {
        return parse_error;
    }
    TransportError::network(format!("{} failed: {}", service, stderr))
        .with_remote(host)
        .caused_by(parse_error)
}
