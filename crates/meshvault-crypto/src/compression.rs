//! LZ4 frame compression with a self-describing magic number
//!
//! §4.1 step 3 requires the compressed representation to be self-describing:
//! a decoder that encounters bytes it can't parse as an LZ4 frame falls back
//! to treating them as raw, uncompressed bytes rather than erroring. This
//! lets the pipeline skip compressing chunks from already-compressed file
//! types (step 3's extension skip-list) without the reassembly path needing
//! to know, per-chunk, whether compression was applied.

use lz4_flex::frame::{FrameDecoder, FrameEncoder};
use std::io::{Read, Write};

use crate::{CryptoError, Result};

/// File extensions whose content is already compressed (video, images,
/// archives, lossy audio); the pipeline skips compression for these to avoid
/// burning CPU for no size benefit.
pub const INCOMPRESSIBLE_EXTENSIONS: &[&str] = &[
    "mp4", "mov", "avi", "jpg", "jpeg", "png", "gif", "webp", "zip", "rar", "7z", "mp3", "flac",
    "aac", "apk", "iso",
];

/// Whether `file_name`'s extension is on the incompressible skip-list.
pub fn is_incompressible(file_name: &str) -> bool {
    match file_name.rsplit_once('.') {
        Some((_, ext)) => INCOMPRESSIBLE_EXTENSIONS
            .iter()
            .any(|known| known.eq_ignore_ascii_case(ext)),
        None => false,
    }
}

/// Compress `data` into an LZ4 frame.
pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = FrameEncoder::new(Vec::new());
    encoder
        .write_all(data)
        .map_err(|e| CryptoError::Encryption(format!("lz4 frame write: {e}")))?;
    encoder
        .finish()
        .map_err(|e| CryptoError::Encryption(format!("lz4 frame finish: {e}")))
}

/// Decompress `data`, produced by [`compress`].
///
/// If `data` isn't a well-formed LZ4 frame — notably, if the magic number at
/// the front doesn't match — the bytes are returned unchanged. This is the
/// "advisory `IsCompressed` bit, decoder falls back to raw bytes" behavior
/// from §9's Design Notes: a chunk that was never compressed (skip-list hit,
/// or an older writer that didn't compress) round-trips correctly either way.
pub fn decompress(data: &[u8]) -> Vec<u8> {
    let mut decoder = FrameDecoder::new(data);
    let mut out = Vec::new();
    match decoder.read_to_end(&mut out) {
        Ok(_) => out,
        Err(_) => data.to_vec(),
    }
}
