use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, Write};
use std::path::Path;

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use tracing::debug;

use crate::cancel::CancelToken;
use crate::core_api::{CoreError, Stage};

const STREAM_CHUNK: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inflated {
    pub data: Vec<u8>,
    pub compressed_len: u64,
}

/// Reads the whole gzip container at `path` into memory.
pub fn decompress_file(path: &Path, cancel: &CancelToken) -> Result<Inflated, CoreError> {
    cancel.check(Stage::Decompress)?;
    let context = path.display().to_string();

    let file = File::open(path)
        .map_err(|e| CoreError::io(Stage::Decompress, format!("{context}: {e}")))?;
    let compressed_len = file
        .metadata()
        .map_err(|e| CoreError::io(Stage::Decompress, format!("{context}: {e}")))?
        .len();

    let data = decompress_reader(BufReader::new(file), &context, cancel)?;
    debug!(path = %context, compressed_len, inflated_len = data.len(), "decompressed");
    Ok(Inflated {
        data,
        compressed_len,
    })
}

/// Drains a gzip stream into a buffer, polling `cancel` between chunks.
pub fn decompress_reader<R: Read>(
    reader: R,
    context: &str,
    cancel: &CancelToken,
) -> Result<Vec<u8>, CoreError> {
    let mut decoder = GzDecoder::new(reader);
    let mut out = Vec::new();
    let mut buf = vec![0u8; STREAM_CHUNK];
    loop {
        cancel.check(Stage::Decompress)?;
        match decoder.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => out.extend_from_slice(&buf[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(CoreError::from_stream(Stage::Decompress, context, e)),
        }
    }

    if decoder.header().is_none() {
        return Err(CoreError::format(
            Stage::Decompress,
            format!("{context}: missing gzip header"),
        ));
    }
    Ok(out)
}

/// Gzips `data` over `path`, replacing whatever was there. Returns the
/// compressed size.
///
/// The write is not atomic: a failure part way leaves a damaged file and the
/// `.bak` copy is the only way back.
pub fn compress_file(path: &Path, data: &[u8], cancel: &CancelToken) -> Result<u64, CoreError> {
    cancel.check(Stage::Compress)?;
    let context = path.display().to_string();
    let io_err = |e: io::Error| CoreError::io(Stage::Compress, format!("{context}: {e}"));

    let file = File::create(path).map_err(io_err)?;
    let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    let writer = compress_into(encoder, data, cancel)?;
    let mut file = writer.into_inner().map_err(|e| io_err(e.into_error()))?;
    let written = file.stream_position().map_err(io_err)?;

    debug!(path = %context, inflated_len = data.len(), written, "compressed");
    Ok(written)
}

/// Compresses `data` into an in-memory gzip buffer.
pub fn compress_bytes(data: &[u8], cancel: &CancelToken) -> Result<Vec<u8>, CoreError> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    compress_into(encoder, data, cancel)
}

fn compress_into<W: Write>(
    mut encoder: GzEncoder<W>,
    data: &[u8],
    cancel: &CancelToken,
) -> Result<W, CoreError> {
    let io_err = |e: io::Error| CoreError::io(Stage::Compress, e.to_string());
    for chunk in data.chunks(STREAM_CHUNK) {
        cancel.check(Stage::Compress)?;
        encoder.write_all(chunk).map_err(io_err)?;
    }
    let mut inner = encoder.finish().map_err(io_err)?;
    inner.flush().map_err(io_err)?;
    Ok(inner)
}
