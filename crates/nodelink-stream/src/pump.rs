use tracing::debug;

use crate::error::Result;
use crate::stream::ByteStream;

/// Copy line-oriented data from `src` into `sink` until EOF.
///
/// Each line is written and drained before the next read, so a consumer of
/// the sink sees output as it is produced. When `src` is exhausted the sink
/// is `eof()`-ed exactly once, after the final byte has been delivered.
///
/// Faults on either stream propagate to the caller; it is the caller's
/// choice whether a broken pipe is an error or an early EOF.
pub async fn pump(src: &mut ByteStream, sink: &mut ByteStream) -> Result<()> {
    loop {
        let line = src.read_line().await?;
        if line.is_empty() {
            debug!("pump source reached EOF");
            sink.eof().await?;
            return Ok(());
        }
        sink.write(&line).await?;
        sink.drain().await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pump_delivers_all_bytes_then_eof() {
        let (mut src_read, mut src_write) = ByteStream::memory().split();
        let (mut sink_read, mut sink_write) = ByteStream::memory().split();

        src_write.write(b"hello\nworld\n").await.unwrap();
        src_write.drain().await.unwrap();
        src_write.eof().await.unwrap();

        pump(&mut src_read, &mut sink_write).await.unwrap();

        assert_eq!(sink_read.read_line().await.unwrap().as_ref(), b"hello\n");
        assert_eq!(sink_read.read_line().await.unwrap().as_ref(), b"world\n");
        assert!(sink_read.read_line().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn pump_streams_lines_while_source_is_live() {
        let (src_read, mut src_write) = ByteStream::memory().split();
        let (mut sink_read, sink_write) = ByteStream::memory().split();

        let pump_task = tokio::spawn(async move {
            let mut src = src_read;
            let mut sink = sink_write;
            pump(&mut src, &mut sink).await
        });

        src_write.write(b"first\n").await.unwrap();
        src_write.drain().await.unwrap();
        assert_eq!(sink_read.read_line().await.unwrap().as_ref(), b"first\n");

        src_write.write(b"second\n").await.unwrap();
        src_write.drain().await.unwrap();
        assert_eq!(sink_read.read_line().await.unwrap().as_ref(), b"second\n");

        src_write.eof().await.unwrap();
        pump_task.await.unwrap().unwrap();
        assert!(sink_read.read_line().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn pump_final_line_without_newline() {
        let (mut src_read, mut src_write) = ByteStream::memory().split();
        let (mut sink_read, mut sink_write) = ByteStream::memory().split();

        src_write.write(b"tail").await.unwrap();
        src_write.eof().await.unwrap();

        pump(&mut src_read, &mut sink_write).await.unwrap();

        assert_eq!(sink_read.read_line().await.unwrap().as_ref(), b"tail");
        assert!(sink_read.read_line().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn pump_empty_source_only_eofs_sink() {
        let (mut src_read, mut src_write) = ByteStream::memory().split();
        let (mut sink_read, mut sink_write) = ByteStream::memory().split();

        src_write.eof().await.unwrap();
        pump(&mut src_read, &mut sink_write).await.unwrap();

        assert!(sink_read.read_line().await.unwrap().is_empty());
    }
}
