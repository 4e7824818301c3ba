// src/archive/decompress.rs

//! Push and bulk decompression of repository databases
//!
//! The compression format is recognized from the stream's magic bytes, so a
//! `.db` file works whether the mirror ships it as gzip, zstd or xz.

use crate::error::{Error, Result};
use flate2::read::GzDecoder as GzReader;
use flate2::write::GzDecoder;
use std::io::{Read, Write};
use std::sync::mpsc;
use std::thread;
use tracing::debug;
use xz2::read::XzDecoder as XzReader;
use xz2::write::XzDecoder;
use zstd::stream::raw::{Decoder as ZstdRaw, InBuffer, Operation, OutBuffer};

/// Longest magic number we need to see before choosing a decoder
const MAGIC_LEN: usize = 6;

/// Read-ahead buffer size used by [`decompress_reader`]
pub const READ_CHUNK: usize = 64 * 1024;

/// Compression formats found on Arch-style mirrors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Gzip,
    Zstd,
    Xz,
}

impl Compression {
    /// Identify the format from the first bytes of a stream
    pub fn detect(head: &[u8]) -> Option<Self> {
        if head.starts_with(&[0x1f, 0x8b]) {
            Some(Compression::Gzip)
        } else if head.starts_with(&[0x28, 0xb5, 0x2f, 0xfd]) {
            Some(Compression::Zstd)
        } else if head.starts_with(&[0xfd, b'7', b'z', b'X', b'Z', 0x00]) {
            Some(Compression::Xz)
        } else {
            None
        }
    }
}

enum DecoderState {
    /// Not enough bytes seen yet to pick a format
    Sniffing(Vec<u8>),
    Gzip(GzDecoder<Vec<u8>>),
    Zstd(ZstdDecoder),
    Xz(XzDecoder<Vec<u8>>),
}

/// Push-mode zstd that remembers whether the last frame was completed
struct ZstdDecoder {
    raw: ZstdRaw<'static>,
    scratch: Vec<u8>,
    out: Vec<u8>,
    frame_done: bool,
}

impl ZstdDecoder {
    fn new() -> std::io::Result<Self> {
        Ok(Self {
            raw: ZstdRaw::new()?,
            scratch: vec![0u8; READ_CHUNK],
            out: Vec::new(),
            frame_done: false,
        })
    }

    fn write(&mut self, data: &[u8]) -> std::io::Result<()> {
        let mut input = InBuffer::around(data);
        loop {
            let before = input.pos;
            let mut output = OutBuffer::around(&mut self.scratch[..]);
            let hint = self.raw.run(&mut input, &mut output)?;
            let written = output.pos();
            self.out.extend_from_slice(&self.scratch[..written]);
            // An idle call after a finished frame asks for the next header
            if hint == 0 {
                self.frame_done = true;
            } else if input.pos > before || written > 0 {
                self.frame_done = false;
            }
            // A full scratch buffer may leave decoded bytes inside the context
            if input.pos == data.len() && written < self.scratch.len() {
                return Ok(());
            }
        }
    }

    fn finish(mut self) -> std::io::Result<Vec<u8>> {
        self.write(&[])?;
        if !self.frame_done {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "incomplete frame",
            ));
        }
        Ok(self.out)
    }
}

/// Incremental decoder fed with arbitrary chunks of a compressed stream.
///
/// The output is identical no matter where chunk boundaries fall.
pub struct StreamDecoder {
    state: DecoderState,
    consumed: u64,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self {
            state: DecoderState::Sniffing(Vec::with_capacity(MAGIC_LEN)),
            consumed: 0,
        }
    }

    /// Compressed bytes accepted so far
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Discard all state so the decoder can be fed a different stream
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Feed the next chunk of compressed input
    pub fn push(&mut self, chunk: &[u8]) -> Result<()> {
        self.consumed += chunk.len() as u64;

        if let DecoderState::Sniffing(head) = &mut self.state {
            head.extend_from_slice(chunk);
            if head.len() < MAGIC_LEN {
                return Ok(());
            }
            let head = std::mem::take(head);
            self.start(&head)?;
            return Ok(());
        }

        self.write(chunk)
    }

    /// Flush the codec and hand back the decompressed bytes
    pub fn finish(mut self) -> Result<Vec<u8>> {
        if let DecoderState::Sniffing(head) = &mut self.state {
            if head.is_empty() {
                return Err(Error::Decompress("empty stream".to_string()));
            }
            let head = std::mem::take(head);
            self.start(&head)?;
        }

        let out = match self.state {
            DecoderState::Gzip(dec) => dec.finish(),
            DecoderState::Zstd(dec) => dec.finish(),
            DecoderState::Xz(mut dec) => dec.finish(),
            DecoderState::Sniffing(_) => {
                return Err(Error::Internal("decoder never left sniffing state".to_string()));
            }
        }
        .map_err(|e| Error::Decompress(format!("Failed to finish stream: {}", e)))?;

        debug!("Decompressed {} bytes into {} bytes", self.consumed, out.len());
        Ok(out)
    }

    fn start(&mut self, head: &[u8]) -> Result<()> {
        let format = Compression::detect(head)
            .ok_or_else(|| Error::Decompress("unrecognized compression format".to_string()))?;
        debug!("Detected {:?} stream", format);

        self.state = match format {
            Compression::Gzip => DecoderState::Gzip(GzDecoder::new(Vec::new())),
            Compression::Zstd => DecoderState::Zstd(
                ZstdDecoder::new()
                    .map_err(|e| Error::InitError(format!("Failed to create zstd decoder: {}", e)))?,
            ),
            Compression::Xz => DecoderState::Xz(XzDecoder::new(Vec::new())),
        };
        self.write(head)
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        let res = match &mut self.state {
            DecoderState::Gzip(dec) => dec.write_all(data),
            DecoderState::Zstd(dec) => dec.write(data),
            DecoderState::Xz(dec) => dec.write_all(data),
            DecoderState::Sniffing(_) => {
                return Err(Error::Internal("write before format detection".to_string()));
            }
        };
        res.map_err(|e| Error::Decompress(format!("Corrupt stream: {}", e)))
    }
}

impl Default for StreamDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Decompress a fully buffered archive
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    let format = Compression::detect(data)
        .ok_or_else(|| Error::Decompress("unrecognized compression format".to_string()))?;

    let mut out = Vec::with_capacity(data.len() * 4);
    match format {
        Compression::Gzip => {
            GzReader::new(data)
                .read_to_end(&mut out)
                .map_err(|e| Error::Decompress(format!("Failed to decompress gzip: {}", e)))?;
        }
        Compression::Zstd => {
            out = zstd::decode_all(data)
                .map_err(|e| Error::Decompress(format!("Failed to decompress zstd: {}", e)))?;
        }
        Compression::Xz => {
            XzReader::new(data)
                .read_to_end(&mut out)
                .map_err(|e| Error::Decompress(format!("Failed to decompress xz: {}", e)))?;
        }
    }

    debug!("Decompressed {:?} database ({} bytes)", format, out.len());
    Ok(out)
}

/// Decompress everything `reader` yields.
///
/// Two buffers alternate between a reader thread and the decoder, so the next
/// chunk is read while the previous one is being decompressed.
pub fn decompress_reader<R: Read + Send>(mut reader: R) -> Result<Vec<u8>> {
    let mut decoder = StreamDecoder::new();

    thread::scope(|s| {
        let (filled_tx, filled_rx) = mpsc::sync_channel::<std::io::Result<Vec<u8>>>(1);
        let (empty_tx, empty_rx) = mpsc::channel::<Vec<u8>>();
        for _ in 0..2 {
            let _ = empty_tx.send(vec![0u8; READ_CHUNK]);
        }

        s.spawn(move || {
            while let Ok(mut buf) = empty_rx.recv() {
                buf.resize(READ_CHUNK, 0);
                let read = loop {
                    match reader.read(&mut buf) {
                        Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                        other => break other,
                    }
                };
                match read {
                    Ok(0) => break,
                    Ok(n) => {
                        buf.truncate(n);
                        if filled_tx.send(Ok(buf)).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = filled_tx.send(Err(e));
                        break;
                    }
                }
            }
        });

        for msg in filled_rx {
            let buf = msg?;
            decoder.push(&buf)?;
            // The reader may already have quit; a closed channel is fine here.
            let _ = empty_tx.send(buf);
        }
        Ok::<(), Error>(())
    })?;

    decoder.finish()
}
