use super::frame::{tpkt::TPKT_LEN, Cotp, Tpkt, WireDecode};
use bytes::{Bytes, BytesMut};
use std::io;
use tokio_util::codec::Decoder;

/// One RFC1006 frame with its COTP header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportFrame {
    pub tpkt: Tpkt,
    pub cotp: Cotp,
    /// S7COMM-PLUS bytes, present once a Data TPDU with EOT completes the TSDU
    pub payload: Option<Bytes>,
}

/// RFC1006 (TPKT) + COTP framing for captured or live byte streams
#[derive(Debug, Default)]
pub struct Codec {
    /// Data TPDUs received without EOT
    pending: BytesMut,
}

impl Decoder for Codec {
    type Item = TransportFrame;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < TPKT_LEN {
            return Ok(None);
        }
        if src[0] != 0x03 || src[1] != 0x00 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "invalid TPKT header",
            ));
        }
        let length = u16::from_be_bytes([src[2], src[3]]) as usize;
        if length < TPKT_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "invalid TPKT length",
            ));
        }
        if src.len() < length {
            src.reserve(length - src.len());
            return Ok(None);
        }

        let frame = src.split_to(length).freeze();
        let (_, tpkt) = Tpkt::parse(&frame, &frame, &())?;
        let (rest, cotp) = Cotp::parse(&frame[TPKT_LEN..], &frame, &())?;
        // User data starts after the LI-declared header, options included
        let user = frame.slice(frame.len() - rest.len()..);

        let payload = match &cotp {
            Cotp::D(params) if !params.eot => {
                self.pending.extend_from_slice(&user);
                tracing::trace!(buffered = self.pending.len(), "COTP data without EOT");
                None
            }
            Cotp::D(_) if self.pending.is_empty() => Some(user),
            Cotp::D(_) => {
                self.pending.extend_from_slice(&user);
                Some(self.pending.split().freeze())
            }
            Cotp::Control { tpdu_type, .. } => {
                tracing::debug!(?tpdu_type, "COTP control TPDU");
                None
            }
        };
        Ok(Some(TransportFrame {
            tpkt,
            cotp,
            payload,
        }))
    }
}
