//! Chunked attachment responses.
//!
//! Remote bodies and local files are both read through an [`AsyncRead`] and
//! re-chunked to at most [`RELAY_CHUNK_SIZE`] bytes. A local source keeps its
//! job directory alive inside the body stream, so the file disappears once the
//! last chunk is sent or the client goes away.

use std::{
    io,
    pin::Pin,
    task::{Context, Poll},
};

use axum::{
    body::{Body, Bytes},
    http::{
        HeaderMap, HeaderValue,
        header::{CONTENT_DISPOSITION, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
};
use futures_util::{Stream, TryStreamExt};
use tokio::io::AsyncRead;
use tokio_util::io::{ReaderStream, StreamReader};
use tracing::info;

use crate::{
    backend::{MediaSource, TempJob},
    error::ApiError,
    formats::FormatCode,
};

pub const RELAY_CHUNK_SIZE: usize = 8 * 1024;

type ByteReader = Pin<Box<dyn AsyncRead + Send>>;

pub struct RelayStream {
    inner: ReaderStream<ByteReader>,
    _job: Option<TempJob>,
}

impl RelayStream {
    pub async fn open(source: MediaSource) -> Result<Self, ApiError> {
        let (reader, job) = match source {
            MediaSource::Remote(response) => {
                let body = response.bytes_stream().map_err(io::Error::other);
                let reader: ByteReader = Box::pin(StreamReader::new(body));
                (reader, None)
            }
            MediaSource::Local { job, path } => {
                let file = tokio::fs::File::open(&path).await.map_err(|error| {
                    ApiError::transfer_failure(format!("Dosya aktarım hatası: {error}"))
                })?;
                let reader: ByteReader = Box::pin(file);
                (reader, Some(job))
            }
        };

        Ok(Self {
            inner: ReaderStream::with_capacity(reader, RELAY_CHUNK_SIZE),
            _job: job,
        })
    }
}

impl Stream for RelayStream {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

pub async fn attachment(source: MediaSource, format: FormatCode) -> Result<Response, ApiError> {
    let filename = format.attachment_filename();
    info!("Relaying {:?} as {filename}", source);
    let stream = RelayStream::open(source).await?;

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(format.mime_type()));
    headers.insert(
        CONTENT_DISPOSITION,
        HeaderValue::from_str(&format!("attachment; filename=\"{filename}\""))
            .map_err(|_| ApiError::internal("Could not build the download header."))?,
    );

    Ok((headers, Body::from_stream(stream)).into_response())
}
