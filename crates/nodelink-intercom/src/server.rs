use std::sync::Arc;

use nodelink_stream::ByteStream;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{IntercomError, Result};

/// The server side of an intercom rendezvous.
///
/// Binds an ephemeral port on all interfaces and accepts exactly one client.
/// The listening socket is released as soon as the first connection lands,
/// so a second connection attempt is never serviced.
///
/// Create it with [`start_intercom`] or [`IntercomServer::start`].
pub struct IntercomServer {
    port: u16,
    shared: Arc<Shared>,
    cancel: CancellationToken,
    accept_task: Option<JoinHandle<()>>,
}

struct Shared {
    state: Mutex<State>,
    connected: Notify,
}

enum State {
    Listening,
    Connected(Option<ByteStream>),
    Closed,
}

/// Start an intercom server on an ephemeral port.
pub async fn start_intercom() -> Result<IntercomServer> {
    IntercomServer::start().await
}

impl IntercomServer {
    /// Bind `0.0.0.0:0` and begin accepting in a background task.
    pub async fn start() -> Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", 0))
            .await
            .map_err(IntercomError::Bind)?;
        let port = listener.local_addr().map_err(IntercomError::Bind)?.port();
        info!(port, "intercom listening");

        let shared = Arc::new(Shared {
            state: Mutex::new(State::Listening),
            connected: Notify::new(),
        });
        let cancel = CancellationToken::new();
        let accept_task = tokio::spawn(accept_one(listener, Arc::clone(&shared), cancel.clone()));

        Ok(Self {
            port,
            shared,
            cancel,
            accept_task: Some(accept_task),
        })
    }

    /// The ephemeral port the listener is bound to.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Wait until a client has connected.
    ///
    /// Safe to call before or after the connection lands; returns
    /// immediately when already connected. This wait is cancellable: if the
    /// server is closed before any client connects, every waiter wakes with
    /// [`IntercomError::Closed`] instead of hanging.
    pub async fn wait_connected(&self) -> Result<()> {
        loop {
            let notified = self.shared.connected.notified();
            tokio::pin!(notified);
            // Register before inspecting state so a notification between the
            // check and the await cannot be missed.
            notified.as_mut().enable();

            {
                let state = self.shared.state.lock().await;
                match &*state {
                    State::Connected(_) => return Ok(()),
                    State::Closed => return Err(IntercomError::Closed),
                    State::Listening => {}
                }
            }

            notified.await;
        }
    }

    /// Transfer ownership of the accepted connection's stream.
    ///
    /// Returns `None` before a client has connected, or after the stream has
    /// already been taken.
    pub async fn take_stream(&self) -> Option<ByteStream> {
        let mut state = self.shared.state.lock().await;
        match &mut *state {
            State::Connected(stream) => stream.take(),
            _ => None,
        }
    }

    /// Stop accepting and release the listening socket.
    ///
    /// Idempotent. Waiters blocked in [`IntercomServer::wait_connected`] are
    /// woken; an already-accepted connection is unaffected.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Wait until the accept task has released the socket.
    pub async fn wait_closed(&mut self) {
        if let Some(task) = self.accept_task.take() {
            let _ = task.await;
        }
        debug!(port = self.port, "intercom released");
    }
}

impl std::fmt::Debug for IntercomServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntercomServer")
            .field("port", &self.port)
            .finish()
    }
}

impl Drop for IntercomServer {
    fn drop(&mut self) {
        // The accept task owns the listener; cancelling it is enough to
        // release the socket even if the caller never called close().
        self.cancel.cancel();
    }
}

async fn accept_one(listener: TcpListener, shared: Arc<Shared>, cancel: CancellationToken) {
    tokio::select! {
        _ = cancel.cancelled() => {
            let mut state = shared.state.lock().await;
            if matches!(&*state, State::Listening) {
                *state = State::Closed;
            }
            drop(state);
            debug!("intercom closed before any client connected");
        }
        accepted = listener.accept() => {
            let mut state = shared.state.lock().await;
            match accepted {
                Ok((socket, peer)) => {
                    debug!(%peer, "intercom client connected");
                    *state = State::Connected(Some(ByteStream::from_tcp(socket)));
                }
                Err(err) => {
                    debug!(error = %err, "intercom accept failed");
                    *state = State::Closed;
                }
            }
            drop(state);
        }
    }
    shared.connected.notify_waiters();
    // The listener drops here; no further connection is ever serviced.
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::open_intercom;
    use nodelink_frame::{read_json, write_json};
    use serde_json::{json, Value};

    #[tokio::test]
    async fn rendezvous_and_json_exchange_both_ways() {
        let mut server = start_intercom().await.unwrap();
        let mut client = open_intercom(server.port()).await.unwrap();

        server.wait_connected().await.unwrap();
        let mut server_stream = server.take_stream().await.unwrap();

        write_json(client.stream_mut().unwrap(), &json!({"a": 1}))
            .await
            .unwrap();
        let value: Value = read_json(&mut server_stream).await.unwrap();
        assert_eq!(value, json!({"a": 1}));

        write_json(&mut server_stream, &json!({"b": 2})).await.unwrap();
        let value: Value = read_json(client.stream_mut().unwrap()).await.unwrap();
        assert_eq!(value, json!({"b": 2}));

        client.close();
        client.wait_closed().await;
        server.close();
        server.wait_closed().await;
    }

    #[tokio::test]
    async fn wait_connected_blocks_until_client_arrives() {
        let server = Arc::new(start_intercom().await.unwrap());
        let port = server.port();

        let waiter = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.wait_connected().await })
        };

        // Give the waiter a chance to park before connecting.
        tokio::task::yield_now().await;
        let _client = open_intercom(port).await.unwrap();

        waiter.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn wait_connected_returns_immediately_once_connected() {
        let server = start_intercom().await.unwrap();
        let _client = open_intercom(server.port()).await.unwrap();

        server.wait_connected().await.unwrap();
        // A second call must not block or fail.
        server.wait_connected().await.unwrap();
    }

    #[tokio::test]
    async fn close_before_connect_wakes_waiters_with_error() {
        let server = Arc::new(start_intercom().await.unwrap());

        let waiter = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.wait_connected().await })
        };
        tokio::task::yield_now().await;

        server.close();
        let err = waiter.await.unwrap().unwrap_err();
        assert!(matches!(err, IntercomError::Closed));

        // Late callers observe the same terminal state.
        let err = server.wait_connected().await.unwrap_err();
        assert!(matches!(err, IntercomError::Closed));
    }

    #[tokio::test]
    async fn stream_can_be_taken_exactly_once() {
        let server = start_intercom().await.unwrap();
        let _client = open_intercom(server.port()).await.unwrap();
        server.wait_connected().await.unwrap();

        assert!(server.take_stream().await.is_some());
        assert!(server.take_stream().await.is_none());
    }

    #[tokio::test]
    async fn take_stream_before_connection_is_none() {
        let server = start_intercom().await.unwrap();
        assert!(server.take_stream().await.is_none());
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let mut server = start_intercom().await.unwrap();
        server.close();
        server.close();
        server.wait_closed().await;
        server.wait_closed().await;
    }
}
