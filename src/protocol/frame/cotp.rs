use super::{
    super::error::{Error, Result},
    WireDecode, WireEncode,
};
use bytes::{BufMut, Bytes};

/// COTP TPDU types seen on ISO-on-TCP connections
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CotpType {
    /// Connection Request
    Cr = 0xE0,
    /// Connection Confirm
    Cc = 0xD0,
    /// Disconnect Request
    Dr = 0x80,
    /// Disconnect Confirm
    Dc = 0xC0,
    /// Reject
    Re = 0x70,
    /// Data
    D = 0xF0,
}

impl TryFrom<u8> for CotpType {
    type Error = ();

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        // The low nibble of CR/CC carries CDT credit bits
        match value & 0xF0 {
            0xE0 => Ok(CotpType::Cr),
            0xD0 => Ok(CotpType::Cc),
            0x80 => Ok(CotpType::Dr),
            0xC0 => Ok(CotpType::Dc),
            0x70 => Ok(CotpType::Re),
            0xF0 => Ok(CotpType::D),
            _ => Err(()),
        }
    }
}

/// Data TPDU parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CotpDataParams {
    /// Last data unit of the TSDU
    pub eot: bool,
    pub tpdu_nr: u8,
}

impl Default for CotpDataParams {
    fn default() -> Self {
        Self {
            eot: true,
            tpdu_nr: 0,
        }
    }
}

/// COTP TPDU header.
///
/// Only Data TPDUs carry S7COMM-PLUS; the parameters of connection management TPDUs
/// are kept as raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cotp {
    D(CotpDataParams),
    Control { tpdu_type: CotpType, params: Bytes },
}

impl Cotp {
    pub fn tpdu_type(&self) -> CotpType {
        match self {
            Cotp::D(_) => CotpType::D,
            Cotp::Control { tpdu_type, .. } => *tpdu_type,
        }
    }
}

impl WireEncode for Cotp {
    type Error = Error;
    type Context = ();

    /// Header bytes: LI + type + parameters
    fn encoded_len(&self, _ctx: &Self::Context) -> usize {
        match self {
            Cotp::D(_) => 3,
            Cotp::Control { params, .. } => 2 + params.len(),
        }
    }

    fn encode_to<B: BufMut>(&self, dst: &mut B, ctx: &Self::Context) -> Result<()> {
        dst.put_u8((self.encoded_len(ctx) - 1) as u8);
        dst.put_u8(self.tpdu_type() as u8);
        match self {
            Cotp::D(p) => dst.put_u8(if p.eot { 0x80 | p.tpdu_nr } else { p.tpdu_nr }),
            Cotp::Control { params, .. } => dst.put_slice(params),
        }
        Ok(())
    }
}

impl WireDecode for Cotp {
    type Error = Error;
    type Context = ();

    fn parse<'a>(
        input: &'a [u8],
        parent: &Bytes,
        _ctx: &Self::Context,
    ) -> Result<(&'a [u8], Self)> {
        let Some(&li) = input.first() else {
            return Err(Error::TruncatedInput {
                offset: 0,
                needed: 1,
                available: 0,
            });
        };
        let li = li as usize;
        if li < 1 || input.len() < 1 + li {
            return Err(Error::TruncatedInput {
                offset: 0,
                needed: 1 + li.max(1),
                available: input.len(),
            });
        }
        let tpdu_type = CotpType::try_from(input[1]).map_err(|_| Error::InvalidHeader {
            offset: 1,
            context: "unknown COTP TPDU type",
        })?;
        let params = &input[2..1 + li];
        let cotp = match tpdu_type {
            CotpType::D => {
                let Some(&eot_nr) = params.first() else {
                    return Err(Error::InvalidHeader {
                        offset: 0,
                        context: "COTP data TPDU without parameters",
                    });
                };
                Cotp::D(CotpDataParams {
                    eot: eot_nr & 0x80 != 0,
                    tpdu_nr: eot_nr & 0x7F,
                })
            }
            _ => Cotp::Control {
                tpdu_type,
                params: parent.slice_ref(params),
            },
        };
        Ok((&input[1 + li..], cotp))
    }
}
