// src/archive/tar.rs

//! In-memory TAR reader with PAX header support
//!
//! Walks 512-byte ustar header blocks over a decompressed buffer and yields
//! entries that borrow their content from that buffer. PAX `g` headers set
//! overrides that persist for the rest of the archive, PAX `x` headers
//! override only the next entry. Only the `size` and `path` keys are honored.
//!
//! Iteration never panics. When it stops, [`TarReader::status`] tells whether
//! the archive ended cleanly or why it did not.

use thiserror::Error;
use tracing::debug;

const BLOCK: usize = 512;

const NAME: std::ops::Range<usize> = 0..100;
const MODE: std::ops::Range<usize> = 100..108;
const SIZE: std::ops::Range<usize> = 124..136;
const CHECKSUM: std::ops::Range<usize> = 148..156;
const TYPEFLAG: usize = 156;
const LINKNAME: std::ops::Range<usize> = 157..257;
const MAGIC: std::ops::Range<usize> = 257..262;
const PREFIX: std::ops::Range<usize> = 345..500;

/// Why TAR iteration stopped early
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TarError {
    #[error("header checksum mismatch")]
    BadChecksum,

    #[error("missing ustar magic")]
    BadMagic,

    #[error("malformed PAX record: {0}")]
    MalformedPax(String),

    #[error("unknown entry type '{0}'")]
    UnknownType(char),

    #[error("archive truncated")]
    Truncated,

    #[error("expected a second end-of-archive block")]
    MissingEndBlock,
}

/// Entry classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Regular,
    Directory,
    Symlink,
    Other,
}

/// One archive member
#[derive(Debug, Clone)]
pub struct TarEntry<'a> {
    pub path: String,
    pub kind: EntryKind,
    pub size: u64,
    pub mode: u32,
    /// File content; empty for anything but regular files
    pub data: &'a [u8],
    /// Target of a symbolic link
    pub link: Option<String>,
}

#[derive(Debug, Default, Clone)]
struct PaxOverrides {
    size: Option<u64>,
    path: Option<String>,
}

/// Iterator over the entries of a decompressed TAR buffer
pub struct TarReader<'a> {
    buf: &'a [u8],
    pos: usize,
    global: PaxOverrides,
    status: Option<TarError>,
    done: bool,
}

impl<'a> TarReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            global: PaxOverrides::default(),
            status: None,
            done: false,
        }
    }

    /// Error that stopped iteration, if any
    pub fn status(&self) -> Result<(), TarError> {
        match &self.status {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn fail(&mut self, err: TarError) -> Option<TarEntry<'a>> {
        debug!("TAR iteration stopped at offset {}: {}", self.pos, err);
        self.status = Some(err);
        self.done = true;
        None
    }

    /// Next validated header block, `Ok(None)` at a clean end of archive
    fn header(&mut self) -> Result<Option<&'a [u8]>, TarError> {
        let block = block_at(self.buf, self.pos).ok_or(TarError::Truncated)?;

        if is_zero(block) {
            let next = block_at(self.buf, self.pos + BLOCK).ok_or(TarError::Truncated)?;
            if !is_zero(next) {
                return Err(TarError::MissingEndBlock);
            }
            return Ok(None);
        }

        if parse_octal(&block[CHECKSUM]) != checksum(block) {
            return Err(TarError::BadChecksum);
        }
        if &block[MAGIC] != b"ustar" {
            return Err(TarError::BadMagic);
        }
        Ok(Some(block))
    }

    /// Content following the header at the current position
    fn payload(&self, size: u64) -> Result<&'a [u8], TarError> {
        let start = self.pos + BLOCK;
        let end = usize::try_from(size)
            .ok()
            .and_then(|s| start.checked_add(s))
            .ok_or(TarError::Truncated)?;
        self.buf.get(start..end).ok_or(TarError::Truncated)
    }

    fn advance(&mut self, size: u64) -> Result<(), TarError> {
        let padded = usize::try_from(size)
            .ok()
            .and_then(|s| s.checked_next_multiple_of(BLOCK))
            .ok_or(TarError::Truncated)?;
        self.pos = self
            .pos
            .checked_add(BLOCK + padded)
            .ok_or(TarError::Truncated)?;
        Ok(())
    }

    fn step(&mut self) -> Result<Option<TarEntry<'a>>, TarError> {
        let mut local = PaxOverrides::default();

        while let Some(h) = self.header()? {
            let header_size = parse_octal(&h[SIZE]);
            let typeflag = h[TYPEFLAG];

            match typeflag {
                b'g' => {
                    let records = self.payload(header_size)?;
                    parse_pax(records, &mut self.global)?;
                    self.advance(header_size)?;
                }
                b'x' => {
                    let records = self.payload(header_size)?;
                    parse_pax(records, &mut local)?;
                    self.advance(header_size)?;
                }
                b'0'..=b'7' | 0 => {
                    let kind = match typeflag {
                        b'0' | b'7' | 0 => EntryKind::Regular,
                        b'5' => EntryKind::Directory,
                        b'2' => EntryKind::Symlink,
                        _ => EntryKind::Other,
                    };
                    let size = local.size.or(self.global.size).unwrap_or(header_size);
                    let path = match local.path.take().or_else(|| self.global.path.clone()) {
                        Some(p) => p,
                        None => header_path(h),
                    };
                    let data = match kind {
                        EntryKind::Regular => self.payload(size)?,
                        _ => &[],
                    };
                    let link = (kind == EntryKind::Symlink).then(|| cstr(&h[LINKNAME]));
                    let mode = parse_octal(&h[MODE]) as u32;

                    self.advance(size)?;
                    return Ok(Some(TarEntry {
                        path,
                        kind,
                        size,
                        mode,
                        data,
                        link,
                    }));
                }
                other => return Err(TarError::UnknownType(char::from(other))),
            }
        }

        Ok(None)
    }
}

impl<'a> Iterator for TarReader<'a> {
    type Item = TarEntry<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.step() {
            Ok(Some(entry)) => Some(entry),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => self.fail(err),
        }
    }
}

fn block_at(buf: &[u8], pos: usize) -> Option<&[u8]> {
    buf.get(pos..pos.checked_add(BLOCK)?)
}

fn is_zero(block: &[u8]) -> bool {
    block.iter().all(|&b| b == 0)
}

/// Byte sum of the header with the checksum field counted as spaces
fn checksum(block: &[u8]) -> u64 {
    block
        .iter()
        .enumerate()
        .map(|(i, &b)| if CHECKSUM.contains(&i) { b' ' as u64 } else { b as u64 })
        .sum()
}

/// Octal number padded with spaces or NULs
fn parse_octal(field: &[u8]) -> u64 {
    field
        .iter()
        .skip_while(|&&b| b == b' ')
        .take_while(|b| (b'0'..=b'7').contains(*b))
        .fold(0u64, |acc, &d| acc.saturating_mul(8).saturating_add(u64::from(d - b'0')))
}

fn cstr(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

fn header_path(h: &[u8]) -> String {
    let name = cstr(&h[NAME]);
    let prefix = cstr(&h[PREFIX]);
    if prefix.is_empty() {
        name
    } else {
        format!("{}/{}", prefix, name)
    }
}

/// Parse `<len> <key>=<value>\n` records into `into`
fn parse_pax(mut records: &[u8], into: &mut PaxOverrides) -> Result<(), TarError> {
    while !records.is_empty() {
        let space = records
            .iter()
            .position(|&b| b == b' ')
            .ok_or_else(|| TarError::MalformedPax("missing record length".to_string()))?;
        let len: usize = std::str::from_utf8(&records[..space])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| TarError::MalformedPax("bad record length".to_string()))?;
        if len <= space + 1 || len > records.len() || records[len - 1] != b'\n' {
            return Err(TarError::MalformedPax(format!("record length {} out of bounds", len)));
        }

        let body = &records[space + 1..len - 1];
        let eq = body
            .iter()
            .position(|&b| b == b'=')
            .ok_or_else(|| {
                TarError::MalformedPax(format!("expected '=' in '{}'", String::from_utf8_lossy(body)))
            })?;
        let key = &body[..eq];
        let value = String::from_utf8_lossy(&body[eq + 1..]).into_owned();

        match key {
            b"size" => {
                let size = value
                    .parse()
                    .map_err(|_| TarError::MalformedPax(format!("invalid size '{}'", value)))?;
                into.size = Some(size);
            }
            b"path" => into.path = Some(value),
            other => debug!("Ignoring PAX key {}", String::from_utf8_lossy(other)),
        }

        records = &records[len..];
    }
    Ok(())
}
