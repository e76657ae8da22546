//! Content hashing
//!
//! BLAKE3 over the raw bytes is the only thing that decides entity identity.

use crate::error::StorageError;
use crate::types::Digest;
use std::io::{self, Read, Write};

const READ_CHUNK: usize = 64 * 1024;

/// Digest of an in-memory buffer.
pub fn digest_bytes(bytes: &[u8]) -> Digest {
    Digest::from_bytes(*blake3::hash(bytes).as_bytes())
}

/// Digest of a byte stream, read to the end in fixed-size chunks.
///
/// Returns the digest and the number of bytes consumed. Read failures
/// surface as `StorageError::IoError`.
pub fn digest_reader<R: Read>(reader: R) -> Result<(Digest, u64), StorageError> {
    digest_reader_into(reader, &mut io::sink())
}

/// Like [`digest_reader`], but every chunk is also written to `writer`.
pub fn digest_reader_into<R: Read, W: Write>(
    mut reader: R,
    writer: &mut W,
) -> Result<(Digest, u64), StorageError> {
    let mut hasher = blake3::Hasher::new();
    let mut buf = vec![0u8; READ_CHUNK];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(StorageError::IoError(e)),
        };
        hasher.update(&buf[..n]);
        writer.write_all(&buf[..n])?;
        total += n as u64;
    }
    Ok((Digest::from_bytes(*hasher.finalize().as_bytes()), total))
}
