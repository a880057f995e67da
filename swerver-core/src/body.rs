//! Response body plumbing.
//!
//! Responses are either buffered (small generated payloads) or fed by a
//! producer task through a bounded channel. When the client goes away the
//! receiving half is dropped, the producer's next send fails and it stops,
//! releasing whatever file handle or upstream body it held.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty, Full};
use hyper::body::Frame;
use tokio::sync::mpsc;

/// The body type of every response swerver produces.
pub type ServeBody = BoxBody<Bytes, io::Error>;

/// Chunk size used when streaming file contents.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Number of in-flight chunks a producer may buffer ahead of the client.
const CHANNEL_DEPTH: usize = 8;

/// A buffered body holding `bytes`.
pub fn full(bytes: impl Into<Bytes>) -> ServeBody {
    Full::new(bytes.into())
        .map_err(|never| match never {})
        .boxed()
}

/// An empty body.
pub fn empty() -> ServeBody {
    Empty::new().map_err(|never| match never {}).boxed()
}

/// Sender half of a channel body.
pub type BodySender = mpsc::Sender<io::Result<Bytes>>;

/// Creates a body fed through a bounded channel by a producer task.
pub fn channel() -> (BodySender, ServeBody) {
    let (tx, rx) = mpsc::channel(CHANNEL_DEPTH);
    (tx, ChannelBody { rx }.boxed())
}

struct ChannelBody {
    rx: mpsc::Receiver<io::Result<Bytes>>,
}

impl hyper::body::Body for ChannelBody {
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(Ok(chunk))) => Poll::Ready(Some(Ok(Frame::data(chunk)))),
            Poll::Ready(Some(Err(err))) => Poll::Ready(Some(Err(err))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn collect(body: ServeBody) -> Vec<u8> {
        body.collect().await.unwrap().to_bytes().to_vec()
    }

    #[tokio::test]
    async fn test_full_body() {
        assert_eq!(collect(full("hello")).await, b"hello");
    }

    #[tokio::test]
    async fn test_empty_body() {
        assert!(collect(empty()).await.is_empty());
    }

    #[tokio::test]
    async fn test_channel_body() {
        let (tx, body) = channel();
        tokio::spawn(async move {
            tx.send(Ok(Bytes::from_static(b"hello "))).await.unwrap();
            tx.send(Ok(Bytes::from_static(b"world"))).await.unwrap();
        });
        assert_eq!(collect(body).await, b"hello world");
    }

    #[tokio::test]
    async fn test_channel_body_producer_observes_disconnect() {
        let (tx, body) = channel();
        drop(body);

        // The producer sees the closed channel and can stop.
        assert!(tx.send(Ok(Bytes::from_static(b"x"))).await.is_err());
    }
}
