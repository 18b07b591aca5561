//! Cross-thread dialogs.
//!
//! The worker thread holds an `InteractionBridge`; each dialog becomes a
//! `UiRequest` sent to the foreground thread, and the worker blocks on a
//! oneshot reply. The foreground thread runs `Foreground::serve`, which
//! answers requests with a real `Interaction` until every bridge is dropped.

use tokio::sync::{mpsc, oneshot};

use super::Interaction;
use crate::credentials::CredentialRecord;
use crate::secret::SecretBuffer;

/// A dialog the worker needs the foreground to show.
#[derive(Debug)]
pub enum UiRequest {
    Login {
        host: String,
        message: String,
        reply: oneshot::Sender<Option<CredentialRecord>>,
    },
    Passphrase {
        message: String,
        reply: oneshot::Sender<Option<SecretBuffer>>,
    },
    YesNo {
        title: String,
        text: String,
        reply: oneshot::Sender<bool>,
    },
    Error {
        message: String,
        reply: oneshot::Sender<()>,
    },
    LinkRemote {
        remote: String,
        reply: oneshot::Sender<bool>,
    },
}

/// Create a connected bridge/foreground pair.
pub fn channel() -> (InteractionBridge, Foreground) {
    let (tx, rx) = mpsc::unbounded_channel();
    (InteractionBridge { tx }, Foreground { rx })
}

/// Worker-side `Interaction` that forwards every dialog to the foreground.
#[derive(Clone)]
pub struct InteractionBridge {
    tx: mpsc::UnboundedSender<UiRequest>,
}

impl InteractionBridge {
    /// Send a request and wait for its reply. `None` if the foreground is gone.
    fn ask<R>(&self, request: impl FnOnce(oneshot::Sender<R>) -> UiRequest) -> Option<R> {
        let (reply, answer) = oneshot::channel();
        if self.tx.send(request(reply)).is_err() {
            tracing::warn!("Foreground stopped serving dialogs; treating as declined");
            return None;
        }
        answer.blocking_recv().ok()
    }
}

impl Interaction for InteractionBridge {
    fn show_login(&self, host: &str, message: &str) -> Option<CredentialRecord> {
        self.ask(|reply| UiRequest::Login {
            host: host.to_string(),
            message: message.to_string(),
            reply,
        })
        .flatten()
    }

    fn show_passphrase(&self, message: &str) -> Option<SecretBuffer> {
        self.ask(|reply| UiRequest::Passphrase {
            message: message.to_string(),
            reply,
        })
        .flatten()
    }

    fn show_yes_no(&self, title: &str, text: &str) -> bool {
        self.ask(|reply| UiRequest::YesNo {
            title: title.to_string(),
            text: text.to_string(),
            reply,
        })
        .unwrap_or(false)
    }

    fn show_error(&self, message: &str) {
        self.ask(|reply| UiRequest::Error {
            message: message.to_string(),
            reply,
        });
    }

    fn show_link_remote(&self, remote: &str) -> bool {
        self.ask(|reply| UiRequest::LinkRemote {
            remote: remote.to_string(),
            reply,
        })
        .unwrap_or(false)
    }
}

/// Foreground end of the bridge.
pub struct Foreground {
    rx: mpsc::UnboundedReceiver<UiRequest>,
}

impl Foreground {
    /// Answer requests with `ui` until all bridges hang up. Returns how many
    /// dialogs were shown.
    pub fn serve(mut self, ui: &dyn Interaction) -> usize {
        let mut served = 0;
        while let Some(request) = self.rx.blocking_recv() {
            served += 1;
            // A dropped reply receiver means the worker gave up waiting.
            match request {
                UiRequest::Login {
                    host,
                    message,
                    reply,
                } => {
                    let _ = reply.send(ui.show_login(&host, &message));
                }
                UiRequest::Passphrase { message, reply } => {
                    let _ = reply.send(ui.show_passphrase(&message));
                }
                UiRequest::YesNo { title, text, reply } => {
                    let _ = reply.send(ui.show_yes_no(&title, &text));
                }
                UiRequest::Error { message, reply } => {
                    ui.show_error(&message);
                    let _ = reply.send(());
                }
                UiRequest::LinkRemote { remote, reply } => {
                    let _ = reply.send(ui.show_link_remote(&remote));
                }
            }
        }
        served
    }
}
