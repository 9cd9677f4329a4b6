use std::io;

use crate::{Deserialize, Serialize};

/// The acknowledgement body sent back after a model submission.
pub const ACK: &[u8] = b"OK";

/// The body sent back when a submitted model is refused.
pub const NACK: &[u8] = b"REJECTED";

const FETCH_MODEL: u8 = 1;
const SUBMIT_MODEL: u8 = 2;

/// A request sent by a client to the aggregation service.
#[derive(Debug, PartialEq, Eq)]
pub enum Request<'a> {
    /// Asks for the current aggregated model.
    FetchModel,
    /// Hands in a candidate model archive.
    SubmitModel(&'a [u8]),
}

impl Request<'_> {
    fn empty_body<T>() -> io::Result<T> {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "Received an empty request body, expected at least an opcode",
        ))
    }

    fn invalid_opcode<T>(byte: u8) -> io::Result<T> {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Received an invalid opcode {byte}"),
        ))
    }

    fn invalid_length<T>(opcode: u8, len: usize) -> io::Result<T> {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Invalid body length {len} for opcode {opcode}"),
        ))
    }

    /// The opcode byte identifying this request on the wire.
    pub fn opcode(&self) -> u8 {
        match self {
            Request::FetchModel => FETCH_MODEL,
            Request::SubmitModel(_) => SUBMIT_MODEL,
        }
    }
}

impl<'a> Serialize<'a> for Request<'a> {
    fn serialize(&'a self, buf: &mut Vec<u8>) -> Option<&'a [u8]> {
        buf.push(self.opcode());

        match self {
            Request::FetchModel => None,
            Request::SubmitModel(model) => Some(model),
        }
    }
}

impl<'a> Deserialize<'a> for Request<'a> {
    fn deserialize(buf: &'a mut [u8]) -> io::Result<Self> {
        let Some((&mut opcode, rest)) = buf.split_first_mut() else {
            return Self::empty_body();
        };

        match opcode {
            FETCH_MODEL if rest.is_empty() => Ok(Self::FetchModel),
            SUBMIT_MODEL if !rest.is_empty() => Ok(Self::SubmitModel(rest)),
            FETCH_MODEL | SUBMIT_MODEL => Self::invalid_length(opcode, rest.len() + 1),
            byte => Self::invalid_opcode(byte),
        }
    }
}

/// An opaque frame body, used for every reply of the aggregation service.
#[derive(Debug, PartialEq, Eq)]
pub struct Frame<'a>(pub &'a [u8]);

impl<'a> Serialize<'a> for Frame<'a> {
    fn serialize(&'a self, _buf: &mut Vec<u8>) -> Option<&'a [u8]> {
        Some(self.0)
    }
}

impl<'a> Deserialize<'a> for Frame<'a> {
    fn deserialize(buf: &'a mut [u8]) -> io::Result<Self> {
        Ok(Self(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(req: &Request) -> Vec<u8> {
        let mut buf = Vec::new();
        let tail = req.serialize(&mut buf);
        buf.extend_from_slice(tail.unwrap_or_default());
        buf
    }

    #[test]
    fn test_fetch_is_a_single_opcode_byte() {
        assert_eq!(encode(&Request::FetchModel), [FETCH_MODEL]);
    }

    #[test]
    fn test_submit_prefixes_the_payload_with_its_opcode() {
        let mut body = encode(&Request::SubmitModel(b"PK.."));
        assert_eq!(body, [SUBMIT_MODEL, b'P', b'K', b'.', b'.']);

        let req = Request::deserialize(&mut body).unwrap();
        assert_eq!(req, Request::SubmitModel(b"PK.."));
    }

    #[test]
    fn test_fetch_with_trailing_bytes_is_rejected() {
        let mut body = vec![FETCH_MODEL, 0];
        let err = Request::deserialize(&mut body).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_submit_without_payload_is_rejected() {
        let mut body = vec![SUBMIT_MODEL];
        assert!(Request::deserialize(&mut body).is_err());
    }

    #[test]
    fn test_unknown_opcode_is_rejected() {
        let mut body = vec![7, 1, 2];
        assert!(Request::deserialize(&mut body).is_err());
        assert!(Request::deserialize(&mut []).is_err());
    }
}
