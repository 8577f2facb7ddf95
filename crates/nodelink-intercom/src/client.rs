use nodelink_stream::ByteStream;
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::{IntercomError, Result};

/// The client side of an intercom rendezvous: one outbound connection to a
/// parent-announced port on the loopback interface.
///
/// Create it with [`open_intercom`] or [`IntercomClient::connect`].
#[derive(Debug)]
pub struct IntercomClient {
    stream: Option<ByteStream>,
}

/// Connect to an intercom server listening on `port`.
pub async fn open_intercom(port: u16) -> Result<IntercomClient> {
    IntercomClient::connect(port).await
}

impl IntercomClient {
    /// Connect to `127.0.0.1:port`.
    pub async fn connect(port: u16) -> Result<Self> {
        let addr = format!("127.0.0.1:{port}");
        let socket = TcpStream::connect(&addr)
            .await
            .map_err(|source| IntercomError::ConnectFailed {
                addr: addr.clone(),
                source,
            })?;
        debug!(%addr, "intercom connection opened");
        Ok(Self {
            stream: Some(ByteStream::from_tcp(socket)),
        })
    }

    /// Borrow the connection's stream.
    pub fn stream_mut(&mut self) -> Result<&mut ByteStream> {
        self.stream.as_mut().ok_or(IntercomError::Closed)
    }

    /// Transfer ownership of the connection's stream.
    pub fn take_stream(&mut self) -> Option<ByteStream> {
        self.stream.take()
    }

    /// Release the connection immediately.
    pub fn close(&mut self) {
        if let Some(stream) = &mut self.stream {
            stream.close();
        }
    }

    /// Complete a graceful release of the connection.
    pub async fn wait_closed(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.wait_closed().await;
        }
    }
}
