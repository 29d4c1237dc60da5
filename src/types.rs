use crate::protocol::frame::dictionaries::Dictionaries;
use serde::{Deserialize, Serialize};
use std::{io, path::PathBuf};

/// Decoder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecoderConfig {
    /// Reassemble telegrams spanning several segments (default true)
    #[serde(default = "DecoderConfig::default_reassemble")]
    pub reassemble: bool,
    /// Inflate compressed XML blobs registered in the extended decode table (default true)
    #[serde(default = "DecoderConfig::default_decompress_blobs")]
    pub decompress_blobs: bool,
    /// Maximum nesting of id-value lists and object trees (default 64)
    #[serde(default = "DecoderConfig::default_max_depth")]
    pub max_depth: usize,
    /// Upper bound on inflated blob size in bytes (default 4 MiB)
    #[serde(default = "DecoderConfig::default_max_decompressed_size")]
    pub max_decompressed_size: usize,
    /// Directory of preset zlib dictionaries, read by [`DecoderConfig::load_dictionaries`]
    #[serde(default)]
    pub dictionary_dir: Option<PathBuf>,
    /// Preset dictionaries available to the blob decompressor
    #[serde(skip)]
    pub dictionaries: Dictionaries,
}

impl DecoderConfig {
    fn default_reassemble() -> bool {
        true
    }

    fn default_decompress_blobs() -> bool {
        true
    }

    fn default_max_depth() -> usize {
        64
    }

    fn default_max_decompressed_size() -> usize {
        4 * 1024 * 1024
    }

    /// Load the dictionaries in `dictionary_dir`, if one is configured.
    pub fn load_dictionaries(&mut self) -> io::Result<()> {
        if let Some(dir) = &self.dictionary_dir {
            self.dictionaries = Dictionaries::load_dir(dir)?;
            tracing::info!(dir = %dir.display(), count = self.dictionaries.len(), "Loaded preset dictionaries");
        }
        Ok(())
    }
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            reassemble: Self::default_reassemble(),
            decompress_blobs: Self::default_decompress_blobs(),
            max_depth: Self::default_max_depth(),
            max_decompressed_size: Self::default_max_decompressed_size(),
            dictionary_dir: None,
            dictionaries: Dictionaries::default(),
        }
    }
}
