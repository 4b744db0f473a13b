use std::io::Write;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_stream::StreamExt;
use tokio_util::codec::{BytesCodec, FramedRead};

const PUMP_FRAME_CAPACITY: usize = 8 * 1024;

type BoxedWriter = Box<dyn AsyncWrite + Unpin + Send + Sync>;

/// Destination for a child's stdout or stderr.
///
/// Clones share the same writer, so binding one sink to both streams
/// interleaves their output in a single place.
pub struct OutputSink(Arc<tokio::sync::Mutex<BoxedWriter>>);

impl Clone for OutputSink {
    fn clone(&self) -> Self {
        OutputSink(self.0.clone())
    }
}

impl OutputSink {
    pub fn new(writer: impl AsyncWrite + Unpin + Send + Sync + 'static) -> OutputSink {
        OutputSink(Arc::new(tokio::sync::Mutex::new(Box::new(writer))))
    }

    /// Write and flush a chunk while holding the sink
    pub async fn write_all(&self, bytes: &[u8]) -> std::io::Result<()> {
        let mut writer = self.0.lock().await;
        writer.write_all(bytes).await?;
        writer.flush().await
    }
}

/// Source copied into a child's stdin; the pipe is closed once it reaches EOF
pub struct InputSource(Box<dyn AsyncRead + Unpin + Send>);

impl InputSource {
    pub fn new(reader: impl AsyncRead + Unpin + Send + 'static) -> InputSource {
        InputSource(Box::new(reader))
    }

    pub fn into_inner(self) -> Box<dyn AsyncRead + Unpin + Send> {
        self.0
    }
}

/// A synchronous writer shared between the output pump and its owner.
///
/// The pump writes through the [`AsyncWrite`] impl; the owner reads the
/// result back with [`with`](Self::with) once the process has been waited.
pub struct SharedBuffer<W = Vec<u8>>(Arc<Mutex<W>>);

impl<W> Clone for SharedBuffer<W> {
    fn clone(&self) -> Self {
        SharedBuffer(self.0.clone())
    }
}

impl<W: Default> Default for SharedBuffer<W> {
    fn default() -> Self {
        Self::new(W::default())
    }
}

impl<W> SharedBuffer<W> {
    pub fn new(writer: W) -> Self {
        SharedBuffer(Arc::new(Mutex::new(writer)))
    }

    fn lock(&self) -> MutexGuard<'_, W> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with<R>(&self, f: impl FnOnce(&W) -> R) -> R {
        f(&self.lock())
    }
}

impl SharedBuffer<Vec<u8>> {
    /// Copy of everything written so far
    pub fn contents(&self) -> Vec<u8> {
        self.lock().clone()
    }
}

impl<W: Write + Send> AsyncWrite for SharedBuffer<W> {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Poll::Ready(self.lock().write(buf))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(self.lock().flush())
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Pump everything readable from `io` into `out`, frame by frame.
///
/// Returns the number of bytes forwarded once `io` reaches EOF.
pub async fn stream<R: AsyncRead + Unpin>(io: R, out: OutputSink) -> std::io::Result<u64> {
    let mut frames = FramedRead::with_capacity(io, BytesCodec::new(), PUMP_FRAME_CAPACITY);
    let mut forwarded = 0u64;

    while let Some(frame) = frames.next().await {
        let bytes = frame?;
        out.write_all(&bytes).await?;
        forwarded += bytes.len() as u64;
    }

    Ok(forwarded)
}
