//! # Client Session Handler
//!
//! Per-connection state machine for clients: an authentication handshake
//! followed by a request/response loop. Every inbound envelope merges the
//! client's Lamport timestamp; every reply carries a fresh tick.

use log::{debug, info, warn};
use tokio::net::TcpStream;

use crate::common::connection::Connection;
use crate::common::messages::{Envelope, Payload};
use crate::common::task::TaskStatus;

use super::Orchestrator;

impl Orchestrator {
    /// Serve one client connection until it closes or violates the
    /// protocol.
    pub(crate) async fn handle_client(&self, stream: TcpStream) {
        let mut conn = Connection::new(stream);
        // Set once the handshake succeeds; requests before that terminate
        // the connection.
        let mut session_user: Option<String> = None;

        loop {
            let envelope = match conn.read_envelope().await {
                Ok(Some(envelope)) => envelope,
                Ok(None) => break,
                Err(e) => {
                    warn!("client connection lost: {}", e);
                    break;
                }
            };

            if envelope.lamport > 0 {
                self.clock.merge(envelope.lamport);
            }
            debug!(
                "client message {} | clock {}",
                envelope.payload.kind(),
                self.clock.read()
            );

            match envelope.payload {
                Payload::Authenticate(credentials) => {
                    match self
                        .auth
                        .verify(&credentials.username, &credentials.password)
                        .await
                    {
                        Some(token) => {
                            info!("✅ client {} authenticated", credentials.username);
                            session_user = Some(credentials.username);
                            if self.reply(&mut conn, Payload::AuthOk { token }).await.is_err() {
                                break;
                            }
                        }
                        None => {
                            let _ = self.reply(&mut conn, Payload::AuthFail).await;
                            break;
                        }
                    }
                }
                payload => {
                    if session_user.is_none() || !self.token_is_valid(&envelope.token).await {
                        warn!("unauthenticated client request, closing connection");
                        break;
                    }

                    match payload {
                        Payload::SubmitTask(mut task) => {
                            // Whatever the client put on the wire, a fresh
                            // submission starts waiting and unassigned.
                            task.status = TaskStatus::Waiting;
                            task.worker_id = None;
                            let task_id = task.id.clone();
                            info!("📥 task {} received from client {}", task_id, task.client_id);

                            self.tasks.put(task).await;
                            self.replicate().await;
                            self.dispatch_task(&task_id).await;

                            if self
                                .reply(&mut conn, Payload::TaskAccepted { task_id })
                                .await
                                .is_err()
                            {
                                break;
                            }
                        }
                        Payload::QueryStatus { task_id } => {
                            let task = self.tasks.get(&task_id).await;
                            if self.reply(&mut conn, Payload::StatusReply(task)).await.is_err() {
                                break;
                            }
                        }
                        other => {
                            warn!(
                                "unexpected client message {}, closing connection",
                                other.kind()
                            );
                            break;
                        }
                    }
                }
            }
        }

        debug!("client connection closed");
    }

    async fn token_is_valid(&self, token: &Option<String>) -> bool {
        match token {
            Some(token) => self.auth.user_of(token).await.is_some(),
            None => false,
        }
    }

    /// Send a reply stamped with a fresh clock tick.
    async fn reply(&self, conn: &mut Connection, payload: Payload) -> anyhow::Result<()> {
        let envelope = Envelope::new(payload).with_lamport(self.clock.tick());
        conn.write_envelope(&envelope).await
    }
}
