//! Length-prefixed JSON framing for dispatch messages.
//!
//! Every message is one frame: a 4-byte big-endian length followed by the
//! UTF-8 JSON payload. Framing is delegated to `LengthDelimitedCodec`, so a
//! message split across reads or coalesced with the next one is reassembled
//! correctly.

use std::marker::PhantomData;

use bytes::{Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

use crate::error::ProtocolError;
use crate::messages::{DispatchRequest, DispatchResponse};

/// Default upper bound on a single frame's payload (8 MiB).
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 8 * 1024 * 1024;

/// Codec used on the worker side: reads requests, writes responses.
pub type WorkerCodec = JsonCodec<DispatchRequest, DispatchResponse>;

/// Codec used on the caller side: reads responses, writes requests.
pub type CallerCodec = JsonCodec<DispatchResponse, DispatchRequest>;

/// Frames `E` values out and `D` values in as length-prefixed JSON.
#[derive(Debug)]
pub struct JsonCodec<D, E> {
    frames: LengthDelimitedCodec,
    _marker: PhantomData<fn(E) -> D>,
}

impl<D, E> JsonCodec<D, E> {
    /// Creates a codec that rejects frames longer than `max_frame_length`.
    #[must_use]
    pub fn new(max_frame_length: usize) -> Self {
        let frames = LengthDelimitedCodec::builder()
            .big_endian()
            .length_field_length(4)
            .max_frame_length(max_frame_length)
            .new_codec();
        Self {
            frames,
            _marker: PhantomData,
        }
    }
}

impl<D, E> Default for JsonCodec<D, E> {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_LENGTH)
    }
}

impl<D: DeserializeOwned, E> Decoder for JsonCodec<D, E> {
    type Item = D;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<D>, ProtocolError> {
        match self.frames.decode(src)? {
            Some(frame) => decode_payload(&frame).map(Some),
            None => Ok(None),
        }
    }
}

impl<D, E: Serialize> Encoder<E> for JsonCodec<D, E> {
    type Error = ProtocolError;

    fn encode(&mut self, item: E, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let payload = encode_payload(&item)?;
        self.frames.encode(payload, dst)?;
        Ok(())
    }
}

/// Serializes a message into an unframed JSON payload.
///
/// # Errors
///
/// Returns `ProtocolError::Encode` if the value cannot be represented as JSON.
pub fn encode_payload<T: Serialize>(message: &T) -> Result<Bytes, ProtocolError> {
    serde_json::to_vec(message)
        .map(Bytes::from)
        .map_err(ProtocolError::Encode)
}

/// Parses an unframed payload as UTF-8 JSON.
///
/// # Errors
///
/// Returns `ProtocolError::Utf8` or `ProtocolError::Json` for payloads that
/// are not valid text or do not match the expected message shape.
pub fn decode_payload<T: DeserializeOwned>(payload: &[u8]) -> Result<T, ProtocolError> {
    let text = std::str::from_utf8(payload)?;
    serde_json::from_str(text).map_err(ProtocolError::Json)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;
    use crate::messages::Kwargs;

    fn framed(payload: &[u8]) -> BytesMut {
        let mut buf = BytesMut::new();
        let len = u32::try_from(payload.len()).unwrap();
        buf.extend_from_slice(&len.to_be_bytes());
        buf.extend_from_slice(payload);
        buf
    }

    #[test]
    fn encodes_with_big_endian_length_prefix() {
        let mut codec = CallerCodec::default();
        let mut dst = BytesMut::new();
        codec
            .encode(DispatchRequest::new("x", vec![], Kwargs::new()), &mut dst)
            .unwrap();

        let len = u32::from_be_bytes([dst[0], dst[1], dst[2], dst[3]]) as usize;
        assert_eq!(len, dst.len() - 4);
        let body: serde_json::Value = serde_json::from_slice(&dst[4..]).unwrap();
        assert_eq!(body["task"], "x");
    }

    #[test]
    fn partial_frame_waits_for_more_bytes() {
        let mut codec = WorkerCodec::default();
        let full = framed(br#"{"task":"x"}"#);
        let mut src = BytesMut::from(&full[..6]);

        assert!(codec.decode(&mut src).unwrap().is_none());

        src.extend_from_slice(&full[6..]);
        let req = codec.decode(&mut src).unwrap().unwrap();
        assert_eq!(req.task_name(), Some("x"));
    }

    #[test]
    fn coalesced_frames_decode_separately() {
        let mut codec = WorkerCodec::default();
        let mut src = framed(br#"{"task":"a"}"#);
        src.extend_from_slice(&framed(br#"{"task":"b"}"#));

        let first = codec.decode(&mut src).unwrap().unwrap();
        let second = codec.decode(&mut src).unwrap().unwrap();
        assert_eq!(first.task_name(), Some("a"));
        assert_eq!(second.task_name(), Some("b"));
        assert!(codec.decode(&mut src).unwrap().is_none());
    }

    #[test]
    fn invalid_json_is_a_payload_error() {
        let mut codec = WorkerCodec::default();
        let mut src = framed(b"{not json");

        let err = codec.decode(&mut src).unwrap_err();
        assert!(matches!(err, ProtocolError::Json(_)));
        assert!(err.is_payload_error());
    }

    #[test]
    fn invalid_utf8_is_a_payload_error() {
        let mut codec = WorkerCodec::default();
        let mut src = framed(&[0xff, 0xfe, 0xfd]);

        let err = codec.decode(&mut src).unwrap_err();
        assert!(matches!(err, ProtocolError::Utf8(_)));
        assert!(err.is_payload_error());
    }

    #[test]
    fn oversized_frame_is_a_frame_error() {
        let mut codec = WorkerCodec::new(8);
        let mut src = framed(br#"{"task":"too-long"}"#);

        let err = codec.decode(&mut src).unwrap_err();
        assert!(matches!(err, ProtocolError::Frame(_)));
        assert!(!err.is_payload_error());
    }

    #[test]
    fn response_round_trips_through_codecs() {
        let mut worker = WorkerCodec::default();
        let mut caller = CallerCodec::default();
        let mut buf = BytesMut::new();

        worker
            .encode(DispatchResponse::unregistered(), &mut buf)
            .unwrap();
        let resp = caller.decode(&mut buf).unwrap().unwrap();
        assert_eq!(resp, DispatchResponse::unregistered());
    }

    proptest! {
        #[test]
        fn request_survives_arbitrary_segmentation(
            name in "[a-z_]{1,16}",
            ints in proptest::collection::vec(any::<i64>(), 0..8),
            cuts in proptest::collection::vec(any::<usize>(), 0..6),
        ) {
            let args = ints.iter().map(|i| json!(i)).collect();
            let request = DispatchRequest::new(name, args, Kwargs::new());

            let mut caller = CallerCodec::default();
            let mut wire = BytesMut::new();
            caller.encode(request.clone(), &mut wire).unwrap();
            let wire = wire.freeze();

            let mut points: Vec<usize> = cuts.iter().map(|c| c % (wire.len() + 1)).collect();
            points.push(wire.len());
            points.sort_unstable();

            let mut worker = WorkerCodec::default();
            let mut src = BytesMut::new();
            let mut decoded = Vec::new();
            let mut start = 0;
            for end in points {
                src.extend_from_slice(&wire[start..end]);
                start = end;
                while let Some(msg) = worker.decode(&mut src).unwrap() {
                    decoded.push(msg);
                }
            }

            prop_assert_eq!(decoded, vec![request]);
        }
    }
}
