//! The russh server: authentication, exec dispatch, and stream pumps.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use russh::server::{Auth, Config as ServerConfig, Handler, Msg, Server, Session};
use russh::{Channel, ChannelId, CryptoVec};
use tokio::sync::mpsc;

use bellows_auth::{fingerprint_blob, Identity};
use bellows_git::{
    ByteStream, GitRunner, GitService, ServeHandle, ServeOptions, ServeOutcome,
};
use bellows_types::{AuditAction, AuditRecord, Repository, User, Visibility};

use crate::command::parse_git_command;
use crate::hostkey::load_or_generate_host_key;
use crate::{Result, SshError};

/// SSH listener settings.
#[derive(Debug, Clone)]
pub struct SshConfig {
    /// Address the transport listens on.
    pub listen_addr: SocketAddr,
    /// Host key location; generated and persisted when absent.
    pub host_key_path: PathBuf,
}

/// What the SSH transport needs from the rest of the forge. The node wires
/// its stores, predicate, runner, and audit sink behind this seam.
#[async_trait]
pub trait ForgeServices: Send + Sync {
    /// Resolve a public-key fingerprint to an identity.
    fn identity_for_fingerprint(&self, fingerprint: &str) -> Option<Identity>;

    /// Resolve `owner/name` to its record and bare directory.
    fn resolve_repo(&self, owner: &str, name: &str) -> Option<(Repository, PathBuf)>;

    /// Pull predicate.
    fn can_pull(&self, user: Option<&User>, repo: &Repository) -> bool;

    /// Push predicate.
    fn can_push(&self, user: Option<&User>, repo: &Repository) -> bool;

    /// The Git service runner.
    fn runner(&self) -> Arc<dyn GitRunner>;

    /// A push finished: set the default branch if unset and signal CI.
    async fn push_completed(&self, repo: &Repository, actor: &User);

    /// Append an audit record (best effort).
    async fn audit(&self, record: AuditRecord);
}

/// The SSH transport; one [`SshSession`] per client connection.
pub struct SshTransport {
    services: Arc<dyn ForgeServices>,
}

impl SshTransport {
    /// Create the transport.
    pub fn new(services: Arc<dyn ForgeServices>) -> Self {
        Self { services }
    }
}

impl Server for SshTransport {
    type Handler = SshSession;

    fn new_client(&mut self, peer: Option<SocketAddr>) -> SshSession {
        SshSession {
            services: self.services.clone(),
            peer,
            identity: None,
            channels: HashMap::new(),
        }
    }
}

/// Load the host key and serve connections until the listener fails.
pub async fn run(config: SshConfig, services: Arc<dyn ForgeServices>) -> Result<()> {
    let host_key = load_or_generate_host_key(&config.host_key_path)?;
    let server_config = Arc::new(ServerConfig {
        inactivity_timeout: Some(Duration::from_secs(3600)),
        auth_rejection_time: Duration::from_secs(1),
        keys: vec![host_key],
        ..Default::default()
    });

    tracing::info!(addr = %config.listen_addr, "ssh transport listening");
    let mut server = SshTransport::new(services);
    server
        .run_on_address(server_config, config.listen_addr)
        .await?;
    Ok(())
}

struct ChannelState {
    input_tx: Option<mpsc::Sender<std::io::Result<Bytes>>>,
    input_rx: Option<mpsc::Receiver<std::io::Result<Bytes>>>,
    serving: bool,
}

/// Per-connection handler.
pub struct SshSession {
    services: Arc<dyn ForgeServices>,
    peer: Option<SocketAddr>,
    identity: Option<Identity>,
    channels: HashMap<ChannelId, ChannelState>,
}

impl SshSession {
    /// Accept the exec, deliver an error on stderr, and end the channel
    /// with exit status 1.
    fn refuse(
        &self,
        session: &mut Session,
        channel: ChannelId,
        message: &str,
    ) -> std::result::Result<(), SshError> {
        session.channel_success(channel)?;
        session.extended_data(
            channel,
            1,
            CryptoVec::from_slice(format!("bellows: {message}\n").as_bytes()),
        )?;
        session.exit_status_request(channel, 1)?;
        session.eof(channel)?;
        session.close(channel)?;
        Ok(())
    }
}

impl Handler for SshSession {
    type Error = SshError;

    async fn auth_publickey(
        &mut self,
        user: &str,
        public_key: &ssh_key::PublicKey,
    ) -> std::result::Result<Auth, Self::Error> {
        let Ok(blob) = public_key.to_bytes() else {
            return Ok(Auth::Reject {
                proceed_with_methods: None,
            });
        };
        let fingerprint = fingerprint_blob(&blob);
        match self.services.identity_for_fingerprint(&fingerprint) {
            Some(identity) => {
                tracing::info!(
                    user = %identity.user.username,
                    fingerprint = %fingerprint,
                    "ssh public-key authentication succeeded"
                );
                self.identity = Some(identity);
                Ok(Auth::Accept)
            }
            None => {
                tracing::debug!(offered_user = %user, fingerprint = %fingerprint, "unknown ssh key");
                Ok(Auth::Reject {
                    proceed_with_methods: None,
                })
            }
        }
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> std::result::Result<bool, Self::Error> {
        let (tx, rx) = mpsc::channel(16);
        self.channels.insert(
            channel.id(),
            ChannelState {
                input_tx: Some(tx),
                input_rx: Some(rx),
                serving: false,
            },
        );
        Ok(true)
    }

    async fn exec_request(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> std::result::Result<(), Self::Error> {
        let identity = self
            .identity
            .clone()
            .ok_or(SshError::Protocol(russh::Error::Inconsistent))?;
        let input_rx = {
            let state = self
                .channels
                .get_mut(&channel)
                .ok_or(SshError::Protocol(russh::Error::WrongChannel))?;
            if state.serving {
                return Err(SshError::Protocol(russh::Error::Inconsistent));
            }
            state.input_rx.take()
        };

        let payload = String::from_utf8_lossy(data).into_owned();
        let command = match parse_git_command(&payload) {
            Ok(command) => command,
            Err(message) => return self.refuse(session, channel, &message),
        };

        let Some((repo, repo_dir)) = self.services.resolve_repo(&command.owner, &command.repo)
        else {
            return self.refuse(session, channel, "repository not found");
        };

        let user = Some(&identity.user);
        let allowed = match command.service {
            GitService::UploadPack => self.services.can_pull(user, &repo),
            GitService::ReceivePack => self.services.can_push(user, &repo),
        };
        if !allowed {
            // Private repositories are hidden from the unauthorized, same
            // as the transport's 404 policy over HTTP.
            let message = if repo.visibility == Visibility::Private
                && !self.services.can_pull(user, &repo)
            {
                "repository not found"
            } else {
                "access denied"
            };
            return self.refuse(session, channel, message);
        }

        let input: ByteStream = match input_rx {
            Some(rx) => Box::pin(futures::stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            })),
            None => return Err(SshError::Protocol(russh::Error::Inconsistent)),
        };

        let serve = self
            .services
            .runner()
            .serve(
                command.service,
                &repo_dir,
                input,
                ServeOptions {
                    stateless_rpc: false,
                    protocol: None,
                },
            )
            .await;
        let serve = match serve {
            Ok(serve) => serve,
            Err(e) => {
                tracing::error!(error = %e, repo = %repo.full_name(), "failed to start git service");
                return self.refuse(session, channel, "internal error");
            }
        };

        if let Some(state) = self.channels.get_mut(&channel) {
            state.serving = true;
        }
        session.channel_success(channel)?;

        let pump = ServicePump {
            services: self.services.clone(),
            handle: session.handle(),
            channel,
            service: command.service,
            repo,
            actor: identity.user.clone(),
            ip: self.peer.map(|p| p.ip().to_string()),
        };
        tokio::spawn(pump.run(serve));
        Ok(())
    }

    async fn data(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        _session: &mut Session,
    ) -> std::result::Result<(), Self::Error> {
        let tx = {
            let state = self
                .channels
                .get(&channel)
                .ok_or(SshError::Protocol(russh::Error::WrongChannel))?;
            if !state.serving {
                // Data before an accepted command is a protocol violation.
                return Err(SshError::Protocol(russh::Error::Inconsistent));
            }
            state.input_tx.clone()
        };
        if let Some(tx) = tx {
            // A closed receiver just means the child already finished.
            let _ = tx.send(Ok(Bytes::copy_from_slice(data))).await;
        }
        Ok(())
    }

    async fn channel_eof(
        &mut self,
        channel: ChannelId,
        _session: &mut Session,
    ) -> std::result::Result<(), Self::Error> {
        if let Some(state) = self.channels.get_mut(&channel) {
            // Dropping the sender ends the input stream, which closes the
            // child's stdin.
            state.input_tx = None;
        }
        Ok(())
    }

    async fn channel_close(
        &mut self,
        channel: ChannelId,
        _session: &mut Session,
    ) -> std::result::Result<(), Self::Error> {
        self.channels.remove(&channel);
        Ok(())
    }
}

/// Pumps child stdout to the channel, then reports the outcome.
struct ServicePump {
    services: Arc<dyn ForgeServices>,
    handle: russh::server::Handle,
    channel: ChannelId,
    service: GitService,
    repo: Repository,
    actor: User,
    ip: Option<String>,
}

impl ServicePump {
    async fn run(mut self, serve: ServeHandle) {
        let mut output = serve.output;
        while let Some(chunk) = output.next().await {
            match chunk {
                Ok(bytes) if bytes.is_empty() => {}
                Ok(bytes) => {
                    if self
                        .handle
                        .data(self.channel, CryptoVec::from_slice(&bytes))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!(error = %e, "ssh service output ended early");
                    break;
                }
            }
        }
        drop(output);

        let outcome = serve
            .completion
            .await
            .unwrap_or(ServeOutcome::Cancelled);
        match &outcome {
            ServeOutcome::Completed => {
                if self.service.is_write() {
                    self.services.push_completed(&self.repo, &self.actor).await;
                }
                let action = match self.service {
                    GitService::UploadPack => AuditAction::SshUploadPack,
                    GitService::ReceivePack => AuditAction::SshReceivePack,
                };
                let mut record = AuditRecord::new(action)
                    .actor(Some(self.actor.id))
                    .repo(self.repo.id)
                    .metadata(serde_json::json!({ "path": self.repo.full_name() }));
                if let Some(ip) = &self.ip {
                    record = record.ip(ip.clone());
                }
                self.services.audit(record).await;
            }
            ServeOutcome::Failed { status, stderr } => {
                tracing::warn!(
                    status,
                    stderr = %stderr.trim(),
                    repo = %self.repo.full_name(),
                    "git service failed over ssh"
                );
            }
            ServeOutcome::Cancelled => {
                tracing::debug!(repo = %self.repo.full_name(), "ssh git service cancelled");
            }
        }

        let _ = self
            .handle
            .exit_status_request(self.channel, outcome.exit_code())
            .await;
        let _ = self.handle.eof(self.channel).await;
        let _ = self.handle.close(self.channel).await;
    }
}
