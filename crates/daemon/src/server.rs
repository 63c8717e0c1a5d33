// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Socket server and connection handling.

use rl_audit::AuditStore;
use rl_engine::EventBusError;
use tokio::net::UnixStream;
use tracing::{debug, error};

use crate::lifecycle::DaemonState;
use crate::protocol::{self, Request, Response, DEFAULT_TIMEOUT, PROTOCOL_VERSION};

/// Handle a single client connection
pub async fn handle_connection(
    daemon: &mut DaemonState,
    stream: UnixStream,
) -> Result<(), ServerError> {
    // Split stream for reading/writing
    let (mut reader, mut writer) = stream.into_split();

    // Read request with timeout
    let request = match protocol::read_request(&mut reader, DEFAULT_TIMEOUT).await {
        Ok(req) => req,
        Err(protocol::ProtocolError::Timeout) => {
            error!("Request read timeout");
            return Err(ServerError::Timeout);
        }
        Err(protocol::ProtocolError::ConnectionClosed) => {
            debug!("Client disconnected before sending request");
            return Ok(());
        }
        Err(e) => {
            error!("Failed to read request: {}", e);
            return Err(ServerError::Protocol(e));
        }
    };

    debug!("Received request: {:?}", request);

    let response = handle_request(daemon, request).await;

    debug!("Sending response: {:?}", response);

    protocol::write_response(&mut writer, &response, DEFAULT_TIMEOUT)
        .await
        .map_err(ServerError::Protocol)?;

    Ok(())
}

/// Handle a single request and return a response
pub(crate) async fn handle_request(daemon: &mut DaemonState, request: Request) -> Response {
    match request {
        Request::Ping => Response::Pong,

        Request::Hello { version } => {
            if version != PROTOCOL_VERSION {
                debug!(client = %version, "client speaks a different protocol version");
            }
            Response::Hello {
                version: PROTOCOL_VERSION.to_string(),
            }
        }

        Request::Publish {
            event,
            routing_key,
            context,
        } => {
            let event_id = event.event_id().to_string();
            match daemon
                .bus
                .publish(event, routing_key.as_deref(), context)
                .await
            {
                Ok(()) => Response::Published { event_id },
                Err(EventBusError::Handling(failure)) => Response::PublishFailed {
                    failures: vec![failure],
                },
                Err(e) => Response::Error {
                    message: e.to_string(),
                },
            }
        }

        Request::Health => Response::Health {
            status: daemon.bus.health_check(),
            running: daemon.bus.is_running(),
            uptime_secs: daemon.start_time.elapsed().as_secs(),
        },

        Request::Metrics => Response::Metrics {
            metrics: daemon.bus.metrics(),
        },

        Request::Workers => Response::Workers {
            workers: daemon.bus.workers(),
        },

        Request::DeadLetters => Response::DeadLetters {
            dead_letters: daemon.bus.dead_letters(),
        },

        Request::VerifyAudit => {
            let Some(audit) = &daemon.audit else {
                return Response::Error {
                    message: "audit trail is disabled".to_string(),
                };
            };
            let chain = audit.chain();
            let verified = match chain.verify().await {
                Ok(valid) => chain.store().count().await.map(|entries| (valid, entries)),
                Err(e) => Err(e),
            };
            match verified {
                Ok((valid, entries)) => {
                    if !valid {
                        error!(entries, "audit chain failed verification");
                    }
                    Response::AuditVerified { valid, entries }
                }
                Err(e) => Response::Error {
                    message: e.to_string(),
                },
            }
        }

        Request::Shutdown => {
            daemon.shutdown_requested = true;
            Response::ShuttingDown
        }
    }
}

/// Server errors
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] protocol::ProtocolError),

    #[error("Request timeout")]
    Timeout,
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
