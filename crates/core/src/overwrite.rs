//! A single overwrite pass and its verification read.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

use crate::error::{Mismatch, PassError};
use crate::model::PassPattern;

pub const CHUNK_SIZE: usize = 1024 * 1024;

/// Chunk length used for a file of `file_size` bytes: min(1 MiB, size).
pub fn chunk_len(file_size: u64) -> usize {
    file_size.min(CHUNK_SIZE as u64) as usize
}

/// Overwrites `file_size` bytes from the start of `file` with `byte`.
///
/// Every chunk is flushed and synced to the device before the next one is
/// written. `on_chunk` receives the running byte count after each sync.
pub fn write_pass<F>(
    file: &mut File,
    byte: u8,
    file_size: u64,
    mut on_chunk: F,
) -> Result<u64, PassError>
where
    F: FnMut(u64),
{
    file.seek(SeekFrom::Start(0))?;
    let chunk = chunk_len(file_size);
    let buffer = vec![byte; chunk];
    let mut written = 0_u64;

    while written < file_size {
        let this_chunk = (file_size - written).min(chunk as u64) as usize;
        file.write_all(&buffer[..this_chunk])?;
        file.flush()?;
        file.sync_all()?;
        written += this_chunk as u64;
        on_chunk(written);
    }

    Ok(written)
}

/// Re-reads the pass just written and checks it against `pattern`.
///
/// Fixed patterns are compared byte for byte. A random pass cannot be
/// compared exactly, so each chunk only has to not be uniformly 0x00 or 0xFF.
pub fn verify_pass<F>(
    file: &mut File,
    pattern: PassPattern,
    file_size: u64,
    mut on_chunk: F,
) -> Result<(), PassError>
where
    F: FnMut(u64),
{
    file.seek(SeekFrom::Start(0))?;
    let chunk = chunk_len(file_size);
    let mut buffer = vec![0_u8; chunk];
    let mut verified = 0_u64;

    while verified < file_size {
        let this_chunk = (file_size - verified).min(chunk as u64) as usize;
        let slice = &mut buffer[..this_chunk];
        file.read_exact(slice)?;
        check_chunk(slice, pattern, verified)?;
        verified += this_chunk as u64;
        on_chunk(verified);
    }

    Ok(())
}

fn check_chunk(chunk: &[u8], pattern: PassPattern, offset: u64) -> Result<(), Mismatch> {
    match pattern {
        PassPattern::Fixed(expected) => match chunk.iter().position(|&found| found != expected) {
            Some(index) => Err(Mismatch::Pattern {
                offset: offset + index as u64,
                expected,
                found: chunk[index],
            }),
            None => Ok(()),
        },
        PassPattern::Random => {
            let Some(&first) = chunk.first() else {
                return Ok(());
            };
            let uniform = chunk.iter().all(|&byte| byte == first);
            if uniform && (first == 0x00 || first == 0xFF) {
                Err(Mismatch::NotRandom {
                    offset,
                    found: first,
                })
            } else {
                Ok(())
            }
        }
    }
}
