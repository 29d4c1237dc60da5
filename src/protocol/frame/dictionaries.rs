//! Preset zlib dictionaries for compressed XML attribute blobs.
//!
//! A compressed stream names its dictionary by Adler-32 checksum only. The dictionaries
//! themselves belong to the PLC firmware and are not embedded in this crate: callers load
//! them into a [`Dictionaries`] set (from bytes or from a directory of dictionary files),
//! and a blob naming a checksum that is not loaded fails with
//! `BlobDecompressionNoDictionary`.

use bytes::Bytes;
use std::{fs, io, path::Path};

/// Adler-32 as used by zlib's `FDICT` dictionary id
pub const fn adler32(data: &[u8]) -> u32 {
    const MOD: u32 = 65_521;
    let mut a: u32 = 1;
    let mut b: u32 = 0;
    let mut i = 0;
    while i < data.len() {
        a = (a + data[i] as u32) % MOD;
        b = (b + a) % MOD;
        i += 1;
    }
    (b << 16) | a
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dictionary {
    pub name: String,
    pub data: Bytes,
    pub checksum: u32,
}

/// Loaded preset dictionaries, keyed by the checksum of their bytes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dictionaries {
    entries: Vec<Dictionary>,
}

impl Dictionaries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `data` under `name`, replacing a dictionary with the same checksum.
    pub fn insert(&mut self, name: impl Into<String>, data: impl Into<Bytes>) -> u32 {
        let data = data.into();
        let checksum = adler32(&data);
        let dict = Dictionary {
            name: name.into(),
            data,
            checksum,
        };
        match self.entries.iter_mut().find(|d| d.checksum == checksum) {
            Some(slot) => *slot = dict,
            None => self.entries.push(dict),
        }
        checksum
    }

    /// Load every regular file in `dir`, each named by its file stem.
    pub fn load_dir(dir: impl AsRef<Path>) -> io::Result<Self> {
        let mut out = Self::new();
        for entry in fs::read_dir(dir.as_ref())? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let checksum = out.insert(name, fs::read(&path)?);
            tracing::debug!(path = %path.display(), checksum, "Loaded preset dictionary");
        }
        Ok(out)
    }

    /// Find a dictionary by its Adler-32 id.
    pub fn get(&self, checksum: u32) -> Option<&Dictionary> {
        self.entries.iter().find(|d| d.checksum == checksum)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
