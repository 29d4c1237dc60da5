use super::{
    super::error::{Error, Result},
    dictionaries::Dictionaries,
    types::GLOBAL_SYMBOLICS_ID,
};
use flate2::{Decompress, FlushDecompress, Status};
use serde::Serialize;

/// Version prefix preceding the zlib stream of most compressed attributes
const VERSION_PREFIX_LEN: usize = 4;
const CHUNK: usize = 16 * 1024;

/// A compressed attribute blob and its inflated text
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressedBlob {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_prefix: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dictionary: Option<String>,
    pub text: String,
}

/// Inflate the blob of attribute `id` found at `offset`.
///
/// The 4-byte version prefix is skipped for every attribute except the global
/// symbolics. A stream asking for a preset dictionary is resolved against `dictionaries`.
/// Output beyond `max_size` bytes fails the decode.
pub fn decompress(
    id: u32,
    data: &[u8],
    offset: usize,
    dictionaries: &Dictionaries,
    max_size: usize,
) -> Result<CompressedBlob> {
    let (version_prefix, stream, base) = if id == GLOBAL_SYMBOLICS_ID {
        (None, data, offset)
    } else {
        if data.len() < VERSION_PREFIX_LEN {
            return Err(Error::TruncatedInput {
                offset,
                needed: VERSION_PREFIX_LEN,
                available: data.len(),
            });
        }
        let prefix = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        (
            Some(prefix),
            &data[VERSION_PREFIX_LEN..],
            offset + VERSION_PREFIX_LEN,
        )
    };

    let failed = |reason: String| Error::BlobDecompressionFailed {
        offset: base,
        reason,
    };

    let mut inflater = Decompress::new(true);
    let mut out: Vec<u8> = Vec::new();
    let mut dictionary = None;
    loop {
        let consumed = inflater.total_in() as usize;
        let produced = inflater.total_out();
        let room = (max_size + 1).saturating_sub(out.len()).min(CHUNK);
        if room == 0 {
            return Err(failed(format!("inflated size exceeds {max_size} bytes")));
        }
        out.reserve_exact(room);
        match inflater.decompress_vec(&stream[consumed..], &mut out, FlushDecompress::Finish) {
            Ok(Status::StreamEnd) => break,
            Ok(Status::Ok) | Ok(Status::BufError) => {
                if inflater.total_in() as usize == consumed && inflater.total_out() == produced {
                    return Err(failed("zlib stream ended early".to_string()));
                }
            }
            Err(e) => match e.needs_dictionary() {
                Some(checksum) => {
                    let dict = dictionaries.get(checksum).ok_or(
                        Error::BlobDecompressionNoDictionary {
                            offset: base,
                            checksum,
                        },
                    )?;
                    inflater
                        .set_dictionary(&dict.data)
                        .map_err(|e| failed(e.to_string()))?;
                    dictionary = Some(dict.name.clone());
                }
                None => return Err(failed(e.to_string())),
            },
        }
    }
    if out.len() > max_size {
        return Err(failed(format!("inflated size exceeds {max_size} bytes")));
    }
    tracing::debug!(id, offset, inflated = out.len(), ?dictionary, "Inflated attribute blob");

    Ok(CompressedBlob {
        version_prefix,
        dictionary,
        text: String::from_utf8_lossy(&out).into_owned(),
    })
}
