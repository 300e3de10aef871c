use bytes::Bytes;
use futures_util::stream::BoxStream;

/// Chunked file content as produced by sources and the local cache
pub type ByteStream = BoxStream<'static, crate::Result<Bytes>>;
