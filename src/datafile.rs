//! Flat binary token files.
//!
//! Layout, all little-endian:
//!
//! | bytes            | content                                              |
//! |------------------|------------------------------------------------------|
//! | `0..4`           | magic (`i32`), identifies the body width             |
//! | `4..8`           | element count (`i32`)                                |
//! | `8..1024`        | reserved, zero                                       |
//! | `1024..`         | `count` token ids, `u16` or `u32` each               |

use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TokprepError};
use crate::special_tokens::TokenId;

/// Number of `i32` slots in the header.
pub const HEADER_SLOTS: usize = 256;
/// Header size in bytes.
pub const HEADER_BYTES: usize = HEADER_SLOTS * 4;
/// Magic for files whose body is `u16`.
pub const MAGIC_U16: i32 = 20_240_520;
/// Magic for files whose body is `u32`.
pub const MAGIC_U32: i32 = 20_240_801;

/// Integer width of the token body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenWidth {
    /// Two bytes per token; enough for vocabularies up to 65 536 entries.
    U16,
    /// Four bytes per token.
    U32,
}

impl TokenWidth {
    /// Bytes used per token.
    #[must_use]
    pub fn bytes(self) -> usize {
        match self {
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }

    /// Header magic written for this width.
    #[must_use]
    pub fn magic(self) -> i32 {
        match self {
            Self::U16 => MAGIC_U16,
            Self::U32 => MAGIC_U32,
        }
    }

    /// Maps a header magic back to its width.
    #[must_use]
    pub fn from_magic(magic: i32) -> Option<Self> {
        match magic {
            MAGIC_U16 => Some(Self::U16),
            MAGIC_U32 => Some(Self::U32),
            _ => None,
        }
    }

    /// Largest id representable at this width.
    #[must_use]
    pub fn max_id(self) -> TokenId {
        match self {
            Self::U16 => TokenId::from(u16::MAX),
            Self::U32 => TokenId::MAX,
        }
    }

    /// Narrowest width able to hold `max_id`, the largest id a vocabulary can produce.
    #[must_use]
    pub fn for_max_id(max_id: TokenId) -> Self {
        if max_id <= TokenId::from(u16::MAX) {
            Self::U16
        } else {
            Self::U32
        }
    }

    fn encode(self, id: TokenId, out: &mut Vec<u8>) {
        match self {
            // Range is checked before encoding starts.
            Self::U16 => out.extend_from_slice(&(id as u16).to_le_bytes()),
            Self::U32 => out.extend_from_slice(&id.to_le_bytes()),
        }
    }

    fn decode(self, chunk: &[u8]) -> TokenId {
        match self {
            Self::U16 => TokenId::from(u16::from_le_bytes([chunk[0], chunk[1]])),
            Self::U32 => u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]),
        }
    }
}

impl fmt::Display for TokenWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::U16 => "u16",
            Self::U32 => "u32",
        };
        f.write_str(label)
    }
}

impl FromStr for TokenWidth {
    type Err = TokprepError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "u16" | "16" => Ok(Self::U16),
            "u32" | "32" => Ok(Self::U32),
            other => Err(TokprepError::InvalidConfig(format!(
                "unknown token width {other:?}; expected u16 or u32"
            ))),
        }
    }
}

/// Decoded header of a token file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenFileHeader {
    /// Body width, derived from the magic.
    pub width: TokenWidth,
    /// Number of tokens in the body.
    pub count: usize,
}

impl TokenFileHeader {
    /// Serialises the header into its fixed 1024-byte form.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let count = i32::try_from(self.count).map_err(|_| {
            TokprepError::InvalidConfig(format!(
                "{} tokens exceed the {} a token file header can record",
                self.count,
                i32::MAX
            ))
        })?;
        let mut slots = [0i32; HEADER_SLOTS];
        slots[0] = self.width.magic();
        slots[1] = count;
        Ok(slots.iter().flat_map(|slot| slot.to_le_bytes()).collect())
    }

    /// Parses and validates a header read from `path`.
    pub fn parse(bytes: &[u8], path: &Path) -> Result<Self> {
        if bytes.len() < HEADER_BYTES {
            return Err(TokprepError::invalid_token_file(
                path,
                format!(
                    "file is {} bytes, shorter than the {HEADER_BYTES}-byte header",
                    bytes.len()
                ),
            ));
        }
        let slot = |idx: usize| {
            let start = idx * 4;
            i32::from_le_bytes([
                bytes[start],
                bytes[start + 1],
                bytes[start + 2],
                bytes[start + 3],
            ])
        };
        let magic = slot(0);
        let width = TokenWidth::from_magic(magic).ok_or_else(|| {
            TokprepError::invalid_token_file(path, format!("unrecognised magic {magic}"))
        })?;
        let count = usize::try_from(slot(1)).map_err(|_| {
            TokprepError::invalid_token_file(path, format!("negative token count {}", slot(1)))
        })?;
        Ok(Self { width, count })
    }

    /// Total file size implied by the header.
    #[must_use]
    pub fn file_len(&self) -> u64 {
        (HEADER_BYTES + self.count * self.width.bytes()) as u64
    }
}

/// A token file read fully into memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenFile {
    /// Validated header.
    pub header: TokenFileHeader,
    /// Token body.
    pub tokens: Vec<TokenId>,
}

/// Writes `tokens` to `path` (creating or truncating it) and returns the number written.
///
/// Every id is checked against `width` before the file is touched; an id that does not fit is a
/// [`TokprepError::TokenOutOfRange`].
pub fn write_token_file<P: AsRef<Path>>(
    path: P,
    tokens: &[TokenId],
    width: TokenWidth,
) -> Result<usize> {
    let path = path.as_ref();
    if let Some(&id) = tokens.iter().find(|&&id| id > width.max_id()) {
        return Err(TokprepError::TokenOutOfRange { id, width });
    }
    let header = TokenFileHeader {
        width,
        count: tokens.len(),
    }
    .to_bytes()?;

    let io_err = |err| TokprepError::io(err, Some(path.to_path_buf()));
    let file = File::create(path).map_err(io_err)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(&header).map_err(io_err)?;

    let mut body = Vec::with_capacity(8192 * width.bytes());
    for chunk in tokens.chunks(8192) {
        body.clear();
        for &id in chunk {
            width.encode(id, &mut body);
        }
        writer.write_all(&body).map_err(io_err)?;
    }
    writer.flush().map_err(io_err)?;

    info!("Saved {} tokens to {}", tokens.len(), path.display());
    Ok(tokens.len())
}

/// Reads and validates only the header of a token file, checking the file length against it.
pub fn read_header<P: AsRef<Path>>(path: P) -> Result<TokenFileHeader> {
    let path = path.as_ref();
    let io_err = |err| TokprepError::io(err, Some(path.to_path_buf()));
    let mut file = File::open(path).map_err(io_err)?;
    let actual = file.metadata().map_err(io_err)?.len();
    let mut bytes = Vec::with_capacity(HEADER_BYTES);
    (&mut file)
        .take(HEADER_BYTES as u64)
        .read_to_end(&mut bytes)
        .map_err(io_err)?;
    let header = TokenFileHeader::parse(&bytes, path)?;
    check_length(&header, actual, path)?;
    Ok(header)
}

/// Reads a token file, validating magic, count and body length before decoding the body.
pub fn read_token_file<P: AsRef<Path>>(path: P) -> Result<TokenFile> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|err| TokprepError::io(err, Some(path.to_path_buf())))?;
    let header = TokenFileHeader::parse(&bytes, path)?;
    check_length(&header, bytes.len() as u64, path)?;
    let tokens = bytes[HEADER_BYTES..]
        .chunks_exact(header.width.bytes())
        .map(|chunk| header.width.decode(chunk))
        .collect();
    Ok(TokenFile { header, tokens })
}

fn check_length(header: &TokenFileHeader, actual: u64, path: &Path) -> Result<()> {
    let expected = header.file_len();
    if actual != expected {
        return Err(TokprepError::InvalidTokenFile {
            path: PathBuf::from(path),
            reason: format!(
                "header declares {} {} tokens ({expected} bytes) but file is {actual} bytes",
                header.count, header.width
            ),
        });
    }
    Ok(())
}
