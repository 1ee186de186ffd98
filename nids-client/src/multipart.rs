//! multipart/form-data encoding for chunk transfers
//!
//! Part headers and text fields are small and are written into a scratch
//! buffer; binary payloads are kept as their own `Bytes` segments and handed
//! to the connection as separate frames, so a chunk is never copied.

use crate::backend::ChunkUpload;
use bytes::{BufMut, Bytes, BytesMut};
use hyper::body::{Body, Frame, SizeHint};
use nids_core::ChunkTransferFields;
use std::collections::VecDeque;
use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

/// File name reported for the binary part; the real name travels in the
/// `filename` text field
const CHUNK_PART_FILENAME: &str = "blob";

/// Builder for a multipart/form-data request body
pub struct MultipartForm {
    boundary: String,
    segments: Vec<Bytes>,
    pending: BytesMut,
}

impl MultipartForm {
    /// Start a form with a random boundary
    pub fn new() -> Self {
        Self::with_boundary(format!("nids-{}", uuid::Uuid::new_v4().simple()))
    }

    pub fn with_boundary(boundary: impl Into<String>) -> Self {
        MultipartForm {
            boundary: boundary.into(),
            segments: Vec::new(),
            pending: BytesMut::new(),
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Value for the request's `content-type` header
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Append a text field
    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.open_part(&format!("form-data; name=\"{}\"", name), None);
        self.pending.put_slice(value.as_bytes());
        self.pending.put_slice(b"\r\n");
        self
    }

    /// Append a binary part; `data` is shared, not copied
    pub fn file(mut self, name: &str, filename: &str, data: Bytes) -> Self {
        self.open_part(
            &format!("form-data; name=\"{}\"; filename=\"{}\"", name, filename),
            Some("application/octet-stream"),
        );
        self.flush();
        if !data.is_empty() {
            self.segments.push(data);
        }
        self.pending.put_slice(b"\r\n");
        self
    }

    /// Close the form and turn it into a request body
    pub fn finish(mut self) -> MultipartBody {
        self.pending.put_slice(b"--");
        self.pending.put_slice(self.boundary.as_bytes());
        self.pending.put_slice(b"--\r\n");
        self.flush();

        let remaining = self.segments.iter().map(|s| s.len() as u64).sum();
        MultipartBody {
            segments: self.segments.into(),
            remaining,
        }
    }

    fn open_part(&mut self, disposition: &str, content_type: Option<&str>) {
        self.pending.put_slice(b"--");
        self.pending.put_slice(self.boundary.as_bytes());
        self.pending.put_slice(b"\r\nContent-Disposition: ");
        self.pending.put_slice(disposition.as_bytes());
        self.pending.put_slice(b"\r\n");
        if let Some(content_type) = content_type {
            self.pending.put_slice(b"Content-Type: ");
            self.pending.put_slice(content_type.as_bytes());
            self.pending.put_slice(b"\r\n");
        }
        self.pending.put_slice(b"\r\n");
    }

    fn flush(&mut self) {
        if !self.pending.is_empty() {
            self.segments.push(self.pending.split().freeze());
        }
    }
}

impl Default for MultipartForm {
    fn default() -> Self {
        Self::new()
    }
}

/// Encoded form, yielded one segment per data frame
#[derive(Debug)]
pub struct MultipartBody {
    segments: VecDeque<Bytes>,
    remaining: u64,
}

impl MultipartBody {
    /// Total encoded length in bytes
    pub fn len(&self) -> u64 {
        self.remaining
    }

    pub fn is_empty(&self) -> bool {
        self.remaining == 0
    }
}

impl Body for MultipartBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, Infallible>>> {
        let this = self.get_mut();
        match this.segments.pop_front() {
            Some(segment) => {
                this.remaining -= segment.len() as u64;
                Poll::Ready(Some(Ok(Frame::data(segment))))
            }
            None => Poll::Ready(None),
        }
    }

    fn is_end_stream(&self) -> bool {
        self.segments.is_empty()
    }

    fn size_hint(&self) -> SizeHint {
        SizeHint::with_exact(self.remaining)
    }
}

/// Encode a chunk transfer: the binary `chunk` part followed by its metadata
/// fields. Takes the upload by value so the payload has a single owner.
pub fn encode_chunk(upload: ChunkUpload) -> MultipartForm {
    let ChunkUpload { fields, data } = upload;
    let form = MultipartForm::new().file(ChunkTransferFields::CHUNK_FIELD, CHUNK_PART_FILENAME, data);

    fields
        .text_fields()
        .into_iter()
        .fold(form, |form, (name, value)| form.text(name, &value))
}
