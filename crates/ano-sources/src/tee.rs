//! Fan-out of one byte stream into two independent branches
//!
//! A producer task reads the source once and forwards every chunk to both
//! branches over unbounded channels, so a slow branch never stalls the
//! other. A branch that is dropped stops receiving; the source is dropped
//! once both branches are gone. A source error is delivered to each branch
//! as its own error value.

use ano_core::{AnonError, ByteStream};
use bytes::Bytes;
use futures_util::StreamExt;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

type Item = ano_core::Result<Bytes>;

/// Split `source` into two branches carrying the same chunks
pub fn tee(mut source: ByteStream) -> (ByteStream, ByteStream) {
    let (left_tx, left_rx) = unbounded_channel();
    let (right_tx, right_rx) = unbounded_channel();

    tokio::spawn(async move {
        let mut left = Some(left_tx);
        let mut right = Some(right_tx);
        while left.is_some() || right.is_some() {
            let Some(item) = source.next().await else {
                break;
            };
            match item {
                Ok(chunk) => {
                    forward(&mut left, Ok(chunk.clone()));
                    forward(&mut right, Ok(chunk));
                }
                Err(e) => {
                    forward(&mut left, Err(duplicate(&e)));
                    forward(&mut right, Err(e));
                    break;
                }
            }
        }
    });

    (receiver_stream(left_rx), receiver_stream(right_rx))
}

fn forward(branch: &mut Option<UnboundedSender<Item>>, item: Item) {
    if let Some(tx) = branch
        && tx.send(item).is_err()
    {
        *branch = None;
    }
}

fn receiver_stream(rx: UnboundedReceiver<Item>) -> ByteStream {
    futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    })
    .boxed()
}

/// Same kind and message, independent value
fn duplicate(err: &AnonError) -> AnonError {
    match err {
        AnonError::PathNotSpecified => AnonError::PathNotSpecified,
        AnonError::FileNotFound(p) => AnonError::FileNotFound(p.clone()),
        AnonError::FolderNotSupported(p) => AnonError::FolderNotSupported(p.clone()),
        AnonError::FileTooBig { path, size, max } => AnonError::FileTooBig {
            path: path.clone(),
            size: *size,
            max: *max,
        },
        AnonError::FileNotSupported(p) => AnonError::FileNotSupported(p.clone()),
        AnonError::RepoNotFound(r) => AnonError::RepoNotFound(r.clone()),
        AnonError::UnsupportedSource(s) => AnonError::UnsupportedSource(s.clone()),
        AnonError::SourceUnavailable { context, source } => {
            AnonError::source_unavailable(context.clone(), source.to_string())
        }
        AnonError::Storage(e) => AnonError::Storage(e.to_string().into()),
        AnonError::Io(e) => AnonError::Io(std::io::Error::new(e.kind(), e.to_string())),
        AnonError::Other(e) => AnonError::Other(anyhow::anyhow!("{}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn source(items: Vec<Item>) -> ByteStream {
        stream::iter(items).boxed()
    }

    async fn drain(branch: ByteStream) -> Vec<Item> {
        branch.collect().await
    }

    #[tokio::test]
    async fn test_both_branches_see_all_chunks() {
        let (a, b) = tee(source(vec![
            Ok(Bytes::from_static(b"one")),
            Ok(Bytes::from_static(b"two")),
        ]));
        let (a, b) = tokio::join!(drain(a), drain(b));
        for items in [a, b] {
            let chunks: Vec<Bytes> = items.into_iter().map(|i| i.unwrap()).collect();
            assert_eq!(chunks, vec![Bytes::from_static(b"one"), Bytes::from_static(b"two")]);
        }
    }

    #[tokio::test]
    async fn test_dropped_branch_does_not_stop_other() {
        let (a, b) = tee(source(vec![
            Ok(Bytes::from_static(b"one")),
            Ok(Bytes::from_static(b"two")),
            Ok(Bytes::from_static(b"three")),
        ]));
        drop(a);
        let items = drain(b).await;
        assert_eq!(items.len(), 3);
    }

    #[tokio::test]
    async fn test_error_reaches_both_branches() {
        let (a, b) = tee(source(vec![
            Ok(Bytes::from_static(b"one")),
            Err(AnonError::source_unavailable("blob abc", "reset by peer")),
            Ok(Bytes::from_static(b"never")),
        ]));
        let (a, b) = tokio::join!(drain(a), drain(b));
        for items in [a, b] {
            assert_eq!(items.len(), 2);
            let err = items.into_iter().nth(1).unwrap().unwrap_err();
            assert_eq!(err.code(), "source_unavailable");
            assert!(err.to_string().contains("blob abc"));
        }
    }

    #[test]
    fn test_duplicate_keeps_code() {
        let err = AnonError::FileTooBig {
            path: "a".into(),
            size: 3,
            max: 1,
        };
        assert_eq!(duplicate(&err).code(), "file_too_big");
        let err = AnonError::Io(std::io::Error::other("disk"));
        assert_eq!(duplicate(&err).code(), "internal_error");
    }
}
