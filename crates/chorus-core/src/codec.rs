//! Newline-delimited JSON framing.
//!
//! One frame is one JSON object followed by `\n`. JSON string escaping
//! guarantees no raw newline inside a frame, so scanning for the delimiter
//! always yields exactly one logical frame — never a partial or
//! concatenated one. A maximum encoded length bounds memory per connection.
//!
//! Reads go through [`FrameCodec`] (a [`Decoder`] for use with
//! `FramedRead`); writes pre-encode with [`encode_frame`] so a broadcast
//! can serialize once and fan the same [`Bytes`] out to every recipient.

use std::io;
use std::marker::PhantomData;

use bytes::{BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio_util::codec::Decoder;

/// Default maximum encoded frame length in bytes.
pub const DEFAULT_MAX_FRAME_LEN: usize = 64 * 1024;

/// Framing and envelope errors.
#[derive(Debug, Error)]
pub enum FrameError {
    /// A frame exceeded the maximum encoded length.
    #[error("frame exceeds maximum length of {max} bytes")]
    Oversize {
        /// The configured limit.
        max: usize,
    },
    /// A line was not a well-formed frame.
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    /// Underlying transport error.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Encode one frame to a newline-terminated JSON line.
pub fn encode_frame<T: Serialize>(frame: &T, max_frame_len: usize) -> Result<Bytes, FrameError> {
    let mut buf = BytesMut::with_capacity(128).writer();
    serde_json::to_writer(&mut buf, frame)?;
    let mut buf = buf.into_inner();
    if buf.len() > max_frame_len {
        return Err(FrameError::Oversize { max: max_frame_len });
    }
    buf.put_u8(b'\n');
    Ok(buf.freeze())
}

/// Decoder for one direction of the wire.
///
/// `T` is the frame type expected inbound (`ClientFrame` on the server,
/// `ServerFrame` on the client).
#[derive(Debug)]
pub struct FrameCodec<T> {
    max_frame_len: usize,
    _frame: PhantomData<T>,
}

impl<T> FrameCodec<T> {
    /// Create a codec with the given maximum encoded frame length.
    #[must_use]
    pub fn new(max_frame_len: usize) -> Self {
        Self {
            max_frame_len,
            _frame: PhantomData,
        }
    }
}

impl<T> Default for FrameCodec<T> {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_LEN)
    }
}

impl<T: DeserializeOwned> Decoder for FrameCodec<T> {
    type Item = T;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<T>, FrameError> {
        let Some(pos) = src.iter().position(|&b| b == b'\n') else {
            if src.len() > self.max_frame_len {
                return Err(FrameError::Oversize {
                    max: self.max_frame_len,
                });
            }
            return Ok(None);
        };
        if pos > self.max_frame_len {
            return Err(FrameError::Oversize {
                max: self.max_frame_len,
            });
        }
        let line = src.split_to(pos + 1);
        let line = &line[..pos];
        // Tolerate CRLF peers.
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        let frame = serde_json::from_slice(line)?;
        Ok(Some(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::ClientFrame;

    fn decode_all(codec: &mut FrameCodec<ClientFrame>, input: &[u8]) -> Vec<ClientFrame> {
        let mut buf = BytesMut::from(input);
        let mut out = Vec::new();
        while let Some(frame) = codec.decode(&mut buf).unwrap() {
            out.push(frame);
        }
        out
    }

    #[test]
    fn decode_single_frame() {
        let mut codec = FrameCodec::default();
        let frames = decode_all(&mut codec, b"{\"type\":\"hello\",\"name\":\"alice\"}\n");
        assert_eq!(frames, vec![ClientFrame::Hello { name: "alice".into() }]);
    }

    #[test]
    fn decode_waits_for_delimiter() {
        let mut codec: FrameCodec<ClientFrame> = FrameCodec::default();
        let mut buf = BytesMut::from(&b"{\"type\":\"chat\""[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        // The partial frame stays buffered.
        buf.extend_from_slice(b",\"text\":\"hi\"}\n");
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame, ClientFrame::Chat { text: "hi".into() });
    }

    #[test]
    fn decode_concatenated_frames_one_at_a_time() {
        let mut codec = FrameCodec::default();
        let frames = decode_all(
            &mut codec,
            b"{\"type\":\"chat\",\"text\":\"one\"}\n{\"type\":\"chat\",\"text\":\"two\"}\n",
        );
        assert_eq!(
            frames,
            vec![
                ClientFrame::Chat { text: "one".into() },
                ClientFrame::Chat { text: "two".into() },
            ]
        );
    }

    #[test]
    fn decode_tolerates_crlf() {
        let mut codec = FrameCodec::default();
        let frames = decode_all(&mut codec, b"{\"type\":\"chat\",\"text\":\"hi\"}\r\n");
        assert_eq!(frames, vec![ClientFrame::Chat { text: "hi".into() }]);
    }

    #[test]
    fn decode_rejects_garbage_line() {
        let mut codec: FrameCodec<ClientFrame> = FrameCodec::default();
        let mut buf = BytesMut::from(&b"not json\n"[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(FrameError::Malformed(_))
        ));
    }

    #[test]
    fn decode_rejects_oversize_frame() {
        let mut codec: FrameCodec<ClientFrame> = FrameCodec::new(16);
        let mut buf = BytesMut::from(&b"{\"type\":\"chat\",\"text\":\"aaaaaaaaaa\"}\n"[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(FrameError::Oversize { max: 16 })
        ));
    }

    #[test]
    fn decode_rejects_oversize_without_delimiter() {
        // A peer streaming an endless line must not buffer unbounded.
        let mut codec: FrameCodec<ClientFrame> = FrameCodec::new(16);
        let mut buf = BytesMut::from(&[b'a'; 32][..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(FrameError::Oversize { max: 16 })
        ));
    }

    #[test]
    fn encode_appends_newline() {
        let line = encode_frame(
            &ClientFrame::Hello { name: "alice".into() },
            DEFAULT_MAX_FRAME_LEN,
        )
        .unwrap();
        assert_eq!(&line[..], b"{\"type\":\"hello\",\"name\":\"alice\"}\n");
    }

    #[test]
    fn encode_enforces_length_cap() {
        let result = encode_frame(&ClientFrame::Chat { text: "a".repeat(64) }, 16);
        assert!(matches!(result, Err(FrameError::Oversize { max: 16 })));
    }

    #[test]
    fn encode_decode_round_trip() {
        let frame = ClientFrame::Chat {
            text: "hello\nworld \"quoted\"".into(),
        };
        let line = encode_frame(&frame, DEFAULT_MAX_FRAME_LEN).unwrap();
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::from(&line[..]);
        let back: ClientFrame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(back, frame);
        assert!(buf.is_empty());
    }
}
