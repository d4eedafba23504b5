//! WebSocket framing and zlib-stream decompression for the gateway.

use flate2::{Decompress, FlushDecompress, Status};

use crate::error::{Error, Result};

const ZLIB_SUFFIX: [u8; 4] = [0x00, 0x00, 0xff, 0xff];

/// A per-session zlib-stream inflater.
///
/// Discord's `compress=zlib-stream` gateway option shares one continuous
/// zlib stream across the whole session; a logical payload may be split
/// across several WebSocket messages and is only complete once the
/// accumulated bytes end in the four-byte sync-flush suffix. Must be reset
/// whenever the underlying session is replaced (reconnect or resume without
/// replaying the stream), never shared across sessions.
pub struct Inflater {
    decompress: Decompress,
    buffer: Vec<u8>,
    scratch: Vec<u8>,
}

impl Inflater {
    pub fn new() -> Self {
        Inflater {
            decompress: Decompress::new(true),
            buffer: Vec::new(),
            scratch: Vec::with_capacity(32 * 1024),
        }
    }

    /// Drops any partially-accumulated payload and resets the zlib stream.
    pub fn reset(&mut self) {
        self.decompress = Decompress::new(true);
        self.buffer.clear();
    }

    /// Feeds one WebSocket message's bytes through the inflater.
    ///
    /// Returns `Ok(None)` while a multi-frame payload is still
    /// accumulating. Frames shorter than 4 bytes cannot carry the sync
    /// marker and are passed through unchanged rather than accumulated.
    pub fn process(&mut self, chunk: &[u8]) -> Result<Option<String>> {
        if chunk.len() < 4 {
            return Ok(Some(String::from_utf8_lossy(chunk).into_owned()));
        }
        self.buffer.extend_from_slice(chunk);
        if self.buffer[self.buffer.len() - 4..] != ZLIB_SUFFIX {
            return Ok(None);
        }

        self.scratch.clear();
        let mut consumed = 0usize;
        loop {
            let before_in = self.decompress.total_in() as usize;
            let status = self
                .decompress
                .decompress_vec(&self.buffer[consumed..], &mut self.scratch, FlushDecompress::Sync)
                .map_err(|_| Error::Protocol("zlib-stream decompression failed"))?;
            consumed += self.decompress.total_in() as usize - before_in;
            match status {
                Status::StreamEnd => break,
                _ if consumed >= self.buffer.len() => break,
                _ => continue,
            }
        }
        self.buffer.clear();
        String::from_utf8(std::mem::take(&mut self.scratch))
            .map(Some)
            .map_err(|_| Error::Protocol("decompressed payload was not valid utf-8"))
    }
}

impl Default for Inflater {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::{Compress, FlushCompress};

    fn compress_with_sync_flush(input: &[u8]) -> Vec<u8> {
        let mut compress = Compress::new(flate2::Compression::default(), true);
        let mut out = Vec::new();
        let mut buf = vec![0u8; input.len() + 1024];
        loop {
            let before_in = compress.total_in();
            let before_out = compress.total_out();
            let status = compress
                .compress(&input[before_in as usize..], &mut buf, FlushCompress::Sync)
                .unwrap();
            out.extend_from_slice(&buf[..(compress.total_out() - before_out) as usize]);
            if compress.total_in() as usize == input.len() || matches!(status, flate2::Status::StreamEnd) {
                break;
            }
        }
        out
    }

    #[test]
    fn short_frame_passes_through_unchanged() {
        let mut inflater = Inflater::new();
        let result = inflater.process(&[1, 2]).unwrap();
        assert_eq!(result, Some("\u{1}\u{2}".to_string()));
    }

    #[test]
    fn frame_without_suffix_is_buffered() {
        let mut inflater = Inflater::new();
        let compressed = compress_with_sync_flush(b"{\"op\":10}");
        // strip the trailing sync marker to simulate a split payload
        let (first, _rest) = compressed.split_at(compressed.len() - 4);
        assert_eq!(inflater.process(first).unwrap(), None);
    }

    #[test]
    fn full_payload_round_trips() {
        let mut inflater = Inflater::new();
        let payload = b"{\"op\":10,\"d\":{\"heartbeat_interval\":41250}}";
        let compressed = compress_with_sync_flush(payload);
        let decoded = inflater.process(&compressed).unwrap().unwrap();
        assert_eq!(decoded.as_bytes(), payload);
    }

    #[test]
    fn reset_clears_partial_buffer() {
        let mut inflater = Inflater::new();
        let compressed = compress_with_sync_flush(b"{\"op\":10}");
        let (first, _rest) = compressed.split_at(compressed.len() - 4);
        inflater.process(first).unwrap();
        inflater.reset();
        assert!(inflater.buffer.is_empty());
    }
}
