use std::io;

use flate2::{Compress, Compression, FlushCompress, Status};

/// Deflates one sample payload with an optional preset dictionary.
///
/// Used by NHML `gzipSamples="yes"` and DIMS `content_encoding="deflate"`.
/// The `self` dictionary mode feeds each sample the previous sample's
/// uncompressed payload; the caller manages that rotation (the first sample
/// always compresses without a dictionary).
pub fn deflate_sample(data: &[u8], dictionary: Option<&[u8]>) -> io::Result<Vec<u8>> {
    let mut compress = Compress::new(Compression::best(), true);
    if let Some(dict) = dictionary {
        if !dict.is_empty() {
            compress
                .set_dictionary(dict)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        }
    }
    let mut out = Vec::with_capacity(data.len() / 2 + 64);
    compress
        .compress_vec(data, &mut out, FlushCompress::Finish)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    // grow and continue until the stream is finished
    loop {
        match compress.compress_vec(&[], &mut out, FlushCompress::Finish) {
            Ok(Status::StreamEnd) => break,
            Ok(_) => {
                if out.capacity() == out.len() {
                    out.reserve(out.len() + 256);
                }
            }
            Err(e) => return Err(io::Error::new(io::ErrorKind::Other, e)),
        }
    }
    Ok(out)
}
