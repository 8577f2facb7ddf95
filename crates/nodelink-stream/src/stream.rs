use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, ReadBuf,
    ReadHalf, SimplexStream, WriteHalf,
};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::process::{ChildStderr, ChildStdin, ChildStdout};
use tracing::debug;

use crate::error::{Result, StreamError};

/// Buffer capacity for the in-memory loopback adapter.
const MEMORY_CAPACITY: usize = 64 * 1024;

/// An asynchronous bidirectional byte channel.
///
/// This is the fundamental I/O type every higher layer consumes. A stream
/// holds up to two directional ends; adapters over read-only resources
/// (child stdout, inherited stdin) simply have no write end and vice versa.
/// Loopback adapters ([`ByteStream::memory`], [`ByteStream::pipe`]) connect
/// their own write end to their own read end, which is how test sinks and
/// output captures are built.
pub struct ByteStream {
    read: Option<BufReader<ReadEnd>>,
    write: Option<WriteEnd>,
    closed: bool,
}

enum ReadEnd {
    Memory(ReadHalf<SimplexStream>),
    #[cfg(unix)]
    Pipe(tokio::net::unix::pipe::Receiver),
    Tcp(OwnedReadHalf),
    Stdin(tokio::io::Stdin),
    ChildStdout(ChildStdout),
    ChildStderr(ChildStderr),
}

enum WriteEnd {
    Memory(WriteHalf<SimplexStream>),
    #[cfg(unix)]
    Pipe(tokio::net::unix::pipe::Sender),
    Tcp(OwnedWriteHalf),
    Stdout(tokio::io::Stdout),
    Stderr(tokio::io::Stderr),
    ChildStdin(ChildStdin),
}

impl AsyncRead for ReadEnd {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            ReadEnd::Memory(inner) => Pin::new(inner).poll_read(cx, buf),
            #[cfg(unix)]
            ReadEnd::Pipe(inner) => Pin::new(inner).poll_read(cx, buf),
            ReadEnd::Tcp(inner) => Pin::new(inner).poll_read(cx, buf),
            ReadEnd::Stdin(inner) => Pin::new(inner).poll_read(cx, buf),
            ReadEnd::ChildStdout(inner) => Pin::new(inner).poll_read(cx, buf),
            ReadEnd::ChildStderr(inner) => Pin::new(inner).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for WriteEnd {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            WriteEnd::Memory(inner) => Pin::new(inner).poll_write(cx, buf),
            #[cfg(unix)]
            WriteEnd::Pipe(inner) => Pin::new(inner).poll_write(cx, buf),
            WriteEnd::Tcp(inner) => Pin::new(inner).poll_write(cx, buf),
            WriteEnd::Stdout(inner) => Pin::new(inner).poll_write(cx, buf),
            WriteEnd::Stderr(inner) => Pin::new(inner).poll_write(cx, buf),
            WriteEnd::ChildStdin(inner) => Pin::new(inner).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            WriteEnd::Memory(inner) => Pin::new(inner).poll_flush(cx),
            #[cfg(unix)]
            WriteEnd::Pipe(inner) => Pin::new(inner).poll_flush(cx),
            WriteEnd::Tcp(inner) => Pin::new(inner).poll_flush(cx),
            WriteEnd::Stdout(inner) => Pin::new(inner).poll_flush(cx),
            WriteEnd::Stderr(inner) => Pin::new(inner).poll_flush(cx),
            WriteEnd::ChildStdin(inner) => Pin::new(inner).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            WriteEnd::Memory(inner) => Pin::new(inner).poll_shutdown(cx),
            #[cfg(unix)]
            WriteEnd::Pipe(inner) => Pin::new(inner).poll_shutdown(cx),
            WriteEnd::Tcp(inner) => Pin::new(inner).poll_shutdown(cx),
            WriteEnd::Stdout(inner) => Pin::new(inner).poll_shutdown(cx),
            WriteEnd::Stderr(inner) => Pin::new(inner).poll_shutdown(cx),
            WriteEnd::ChildStdin(inner) => Pin::new(inner).poll_shutdown(cx),
        }
    }
}

impl ByteStream {
    fn from_ends(read: Option<ReadEnd>, write: Option<WriteEnd>) -> Self {
        Self {
            read: read.map(BufReader::new),
            write,
            closed: false,
        }
    }

    /// Create an in-memory loopback stream.
    ///
    /// Bytes written to the write end become readable from the read end.
    /// `eof()` makes the reader observe end-of-stream once the buffered
    /// bytes are drained.
    pub fn memory() -> Self {
        let (r, w) = tokio::io::simplex(MEMORY_CAPACITY);
        Self::from_ends(Some(ReadEnd::Memory(r)), Some(WriteEnd::Memory(w)))
    }

    /// Create a loopback stream over an OS anonymous pipe.
    ///
    /// Same contract as [`ByteStream::memory`], but the bytes travel through
    /// the kernel.
    #[cfg(unix)]
    pub fn pipe() -> Result<Self> {
        let (tx, rx) = tokio::net::unix::pipe::pipe()?;
        Ok(Self::from_ends(
            Some(ReadEnd::Pipe(rx)),
            Some(WriteEnd::Pipe(tx)),
        ))
    }

    /// Adapt a connected TCP socket as a bidirectional stream.
    pub fn from_tcp(stream: TcpStream) -> Self {
        let (r, w) = stream.into_split();
        Self::from_ends(Some(ReadEnd::Tcp(r)), Some(WriteEnd::Tcp(w)))
    }

    /// Read-only adapter over the inherited stdin handle.
    pub fn stdin() -> Self {
        Self::from_ends(Some(ReadEnd::Stdin(tokio::io::stdin())), None)
    }

    /// Write-only adapter over the inherited stdout handle.
    pub fn stdout() -> Self {
        Self::from_ends(None, Some(WriteEnd::Stdout(tokio::io::stdout())))
    }

    /// Write-only adapter over the inherited stderr handle.
    pub fn stderr() -> Self {
        Self::from_ends(None, Some(WriteEnd::Stderr(tokio::io::stderr())))
    }

    /// Read-only adapter over a child process stdout pipe.
    pub fn from_child_stdout(stdout: ChildStdout) -> Self {
        Self::from_ends(Some(ReadEnd::ChildStdout(stdout)), None)
    }

    /// Read-only adapter over a child process stderr pipe.
    pub fn from_child_stderr(stderr: ChildStderr) -> Self {
        Self::from_ends(Some(ReadEnd::ChildStderr(stderr)), None)
    }

    /// Write-only adapter over a child process stdin pipe.
    pub fn from_child_stdin(stdin: ChildStdin) -> Self {
        Self::from_ends(None, Some(WriteEnd::ChildStdin(stdin)))
    }

    /// Tear a stream into an independently owned read half and write half.
    ///
    /// Each half is a `ByteStream` of its own, so two tasks can share a
    /// loopback without sharing mutable state.
    pub fn split(mut self) -> (ByteStream, ByteStream) {
        let read = ByteStream {
            read: self.read.take(),
            write: None,
            closed: self.closed,
        };
        let write = ByteStream {
            read: None,
            write: self.write.take(),
            closed: self.closed,
        };
        (read, write)
    }

    /// Whether the stream has a usable read end.
    pub fn is_readable(&self) -> bool {
        !self.closed && self.read.is_some()
    }

    /// Whether the stream has a usable write end.
    pub fn is_writable(&self) -> bool {
        !self.closed && self.write.is_some()
    }

    /// Whether [`ByteStream::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn reader(&mut self) -> Result<&mut BufReader<ReadEnd>> {
        if self.closed {
            return Err(StreamError::Closed);
        }
        self.read.as_mut().ok_or(StreamError::NotReadable)
    }

    fn writer(&mut self) -> Result<&mut WriteEnd> {
        if self.closed {
            return Err(StreamError::Closed);
        }
        self.write.as_mut().ok_or(StreamError::NotWritable)
    }

    /// Read up to `buf.len()` bytes. A return of 0 signals EOF.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = self.reader()?.read(buf).await?;
        Ok(n)
    }

    /// Read exactly `n` bytes, or fail with [`StreamError::ShortRead`] if
    /// EOF arrives first.
    pub async fn read_exactly(&mut self, n: usize) -> Result<Bytes> {
        let reader = self.reader()?;
        let mut data = vec![0u8; n];
        let mut got = 0usize;
        while got < n {
            let read = reader.read(&mut data[got..]).await?;
            if read == 0 {
                return Err(StreamError::ShortRead { wanted: n, got });
            }
            got += read;
        }
        Ok(Bytes::from(data))
    }

    /// Read bytes up to and including the next `\n`.
    ///
    /// Returns an empty result at EOF; the final line of a source that does
    /// not end in a newline is returned without one.
    pub async fn read_line(&mut self) -> Result<Bytes> {
        let reader = self.reader()?;
        let mut line = Vec::new();
        reader.read_until(b'\n', &mut line).await?;
        Ok(Bytes::from(line))
    }

    /// Enqueue `data` on the write end.
    pub async fn write(&mut self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        self.writer()?.write_all(data).await?;
        Ok(())
    }

    /// Flush queued writes to the underlying resource.
    ///
    /// This is the back-pressure point: a peer's `read_exactly` may only be
    /// relied upon after the writer has drained.
    pub async fn drain(&mut self) -> Result<()> {
        self.writer()?.flush().await?;
        Ok(())
    }

    /// Half-close: shut down and release the write end, leaving the read
    /// end usable. The peer (or the loopback read half) observes EOF once
    /// the remaining bytes are drained.
    pub async fn eof(&mut self) -> Result<()> {
        if self.closed {
            return Err(StreamError::Closed);
        }
        if let Some(mut end) = self.write.take() {
            end.shutdown().await?;
        }
        Ok(())
    }

    /// Release both directions immediately.
    ///
    /// Every subsequent operation fails with [`StreamError::Closed`].
    pub fn close(&mut self) {
        self.read = None;
        self.write = None;
        self.closed = true;
    }

    /// Complete a graceful release and return once the stream is fully
    /// closed. Never blocks after [`ByteStream::close`] has propagated;
    /// shutdown faults during teardown are ignored.
    pub async fn wait_closed(&mut self) {
        if let Some(mut end) = self.write.take() {
            let _ = end.shutdown().await;
        }
        self.read = None;
        self.closed = true;
        debug!("stream fully closed");
    }
}

impl std::fmt::Debug for ByteStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteStream")
            .field("readable", &self.read.is_some())
            .field("writable", &self.write.is_some())
            .field("closed", &self.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_loopback_roundtrip() {
        let mut stream = ByteStream::memory();
        stream.write(b"hello").await.unwrap();
        stream.drain().await.unwrap();

        let data = stream.read_exactly(5).await.unwrap();
        assert_eq!(data.as_ref(), b"hello");
    }

    #[tokio::test]
    async fn memory_eof_then_read_to_end() {
        let mut stream = ByteStream::memory();
        stream.write(b"hello").await.unwrap();
        stream.eof().await.unwrap();

        let mut buf = [0u8; 16];
        let n = stream.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"hello");
        assert_eq!(stream.read(&mut buf).await.unwrap(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn pipe_loopback_roundtrip() {
        let mut stream = ByteStream::pipe().unwrap();
        stream.write(b"through the kernel").await.unwrap();
        stream.drain().await.unwrap();

        let data = stream.read_exactly(18).await.unwrap();
        assert_eq!(data.as_ref(), b"through the kernel");
    }

    #[tokio::test]
    async fn short_read_reports_progress() {
        let mut stream = ByteStream::memory();
        stream.write(b"abc").await.unwrap();
        stream.eof().await.unwrap();

        let err = stream.read_exactly(5).await.unwrap_err();
        assert!(matches!(err, StreamError::ShortRead { wanted: 5, got: 3 }));
    }

    #[tokio::test]
    async fn read_exactly_zero_is_empty() {
        let mut stream = ByteStream::memory();
        let data = stream.read_exactly(0).await.unwrap();
        assert!(data.is_empty());
    }

    #[tokio::test]
    async fn read_line_splits_on_newline() {
        let mut stream = ByteStream::memory();
        stream.write(b"one\ntwo\n").await.unwrap();
        stream.eof().await.unwrap();

        assert_eq!(stream.read_line().await.unwrap().as_ref(), b"one\n");
        assert_eq!(stream.read_line().await.unwrap().as_ref(), b"two\n");
        assert!(stream.read_line().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn read_line_without_trailing_newline() {
        let mut stream = ByteStream::memory();
        stream.write(b"partial").await.unwrap();
        stream.eof().await.unwrap();

        assert_eq!(stream.read_line().await.unwrap().as_ref(), b"partial");
        assert!(stream.read_line().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn operations_after_close_fail() {
        let mut stream = ByteStream::memory();
        stream.close();

        let mut buf = [0u8; 1];
        assert!(matches!(
            stream.read(&mut buf).await.unwrap_err(),
            StreamError::Closed
        ));
        assert!(matches!(
            stream.write(b"x").await.unwrap_err(),
            StreamError::Closed
        ));
        assert!(matches!(
            stream.drain().await.unwrap_err(),
            StreamError::Closed
        ));
    }

    #[tokio::test]
    async fn wait_closed_after_close_returns_immediately() {
        let mut stream = ByteStream::memory();
        stream.close();
        stream.wait_closed().await;
        assert!(stream.is_closed());
    }

    #[tokio::test]
    async fn directionality_is_enforced() {
        let (mut read_half, mut write_half) = ByteStream::memory().split();

        assert!(matches!(
            read_half.write(b"x").await.unwrap_err(),
            StreamError::NotWritable
        ));
        let mut buf = [0u8; 1];
        assert!(matches!(
            write_half.read(&mut buf).await.unwrap_err(),
            StreamError::NotReadable
        ));
    }

    #[tokio::test]
    async fn split_halves_stay_connected() {
        let (mut read_half, mut write_half) = ByteStream::memory().split();

        write_half.write(b"linked").await.unwrap();
        write_half.drain().await.unwrap();
        write_half.eof().await.unwrap();

        let data = read_half.read_exactly(6).await.unwrap();
        assert_eq!(data.as_ref(), b"linked");
        let mut buf = [0u8; 1];
        assert_eq!(read_half.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn zero_byte_write_is_noop() {
        let mut stream = ByteStream::memory();
        stream.write(b"").await.unwrap();
        stream.eof().await.unwrap();
        let mut buf = [0u8; 1];
        assert_eq!(stream.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn tcp_adapter_roundtrip() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut stream = ByteStream::from_tcp(socket);
            let data = stream.read_exactly(4).await.unwrap();
            assert_eq!(data.as_ref(), b"ping");
            stream.write(b"pong").await.unwrap();
            stream.drain().await.unwrap();
        });

        let socket = TcpStream::connect(addr).await.unwrap();
        let mut stream = ByteStream::from_tcp(socket);
        stream.write(b"ping").await.unwrap();
        stream.drain().await.unwrap();
        let data = stream.read_exactly(4).await.unwrap();
        assert_eq!(data.as_ref(), b"pong");

        server.await.unwrap();
    }
}
