//! Chunked transfer encoding decoding
//!
//! Responses from the servers under test are usually small and carry a
//! `Content-Length`, but a chunked body must still be read to completion
//! before the connection can be considered a received response.

use super::{Error, Result};

/// Incremental chunked body decoder
#[derive(Debug)]
pub struct ChunkedDecoder {
    state: DecoderState,
    remaining: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum DecoderState {
    Size,
    Data,
    DataEnd,
    Trailer,
    Complete,
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        ChunkedDecoder {
            state: DecoderState::Size,
            remaining: 0,
        }
    }

    /// Decode as much of `input` as possible, appending payload to `output`.
    ///
    /// Returns the number of input bytes consumed. Unconsumed bytes belong to
    /// an incomplete line and must be offered again with more data.
    pub fn decode(&mut self, input: &[u8], output: &mut Vec<u8>) -> Result<usize> {
        let mut pos = 0;

        while pos < input.len() {
            match self.state {
                DecoderState::Size => {
                    let Some(eol) = find_crlf(&input[pos..]) else { break };
                    let line = String::from_utf8_lossy(&input[pos..pos + eol]);
                    let size = line.split(';').next().unwrap_or("").trim();
                    self.remaining = usize::from_str_radix(size, 16)
                        .map_err(|_| Error::InvalidChunkSize(size.to_string()))?;
                    pos += eol + 2;
                    self.state = if self.remaining == 0 {
                        DecoderState::Trailer
                    } else {
                        DecoderState::Data
                    };
                }
                DecoderState::Data => {
                    let take = self.remaining.min(input.len() - pos);
                    output.extend_from_slice(&input[pos..pos + take]);
                    pos += take;
                    self.remaining -= take;
                    if self.remaining == 0 {
                        self.state = DecoderState::DataEnd;
                    }
                }
                DecoderState::DataEnd => {
                    if input.len() - pos < 2 {
                        break;
                    }
                    if &input[pos..pos + 2] != b"\r\n" {
                        return Err(Error::Protocol("Expected CRLF after chunk".to_string()));
                    }
                    pos += 2;
                    self.state = DecoderState::Size;
                }
                DecoderState::Trailer => {
                    // Trailer fields are skipped up to the terminating empty line.
                    let Some(eol) = find_crlf(&input[pos..]) else { break };
                    pos += eol + 2;
                    if eol == 0 {
                        self.state = DecoderState::Complete;
                    }
                }
                DecoderState::Complete => break,
            }
        }

        Ok(pos)
    }

    /// Check if the terminating chunk has been seen
    pub fn is_complete(&self) -> bool {
        self.state == DecoderState::Complete
    }
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// Decode a complete chunked body held in memory
pub fn decode_chunked_body(input: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = ChunkedDecoder::new();
    let mut output = Vec::new();
    decoder.decode(input, &mut output)?;

    if !decoder.is_complete() {
        return Err(Error::Incomplete);
    }
    Ok(output)
}
