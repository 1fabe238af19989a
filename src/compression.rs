//! Block-parallel gzip
//!
//! The input stream is cut into fixed-size blocks. Each block is deflated on
//! its own by a worker of a bounded rayon pool and emitted as a complete gzip
//! member, in input order. Concatenated gzip members are a valid gzip stream,
//! so the output reads back with `gzip -d`, `tar xzf` or
//! [`flate2::read::MultiGzDecoder`].
//!
//! ## Member layout
//!
//! ```text
//! 1f 8b 08 04 | mtime=0 (4) | xfl=0 | os=255 | xlen=8 (2)
//! 'B' 'S' | len=4 (2) | deflate payload length (u32 LE)
//! deflate payload
//! crc32 (u32 LE) | uncompressed length (u32 LE)
//! ```
//!
//! The `BS` extra subfield lets [`open_container`] find member boundaries
//! without inflating, so decompression runs on the same pool size. Streams
//! without it (written by other tools) are read sequentially.
//!
//! Header fields that vary between runs (mtime, OS) are fixed, so the same
//! input always produces the same bytes.

use crate::error::{ArchiveError, Result};
use flate2::read::{DeflateDecoder, MultiGzDecoder};
use flate2::write::DeflateEncoder;
use flate2::{Compression, Crc};
use rayon::prelude::*;
use std::fs::File;
use std::io::{self, BufReader, Cursor, Read, Write};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, trace};

/// Upper bound for a compression block
pub const MAX_BLOCK_SIZE: usize = 100 * 1024 * 1024;

/// Lower bound for a compression block
pub const MIN_BLOCK_SIZE: usize = 64 * 1024;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const METHOD_DEFLATE: u8 = 8;
const FLAG_EXTRA: u8 = 0x04;
const OS_UNKNOWN: u8 = 255;
const SUBFIELD_ID: [u8; 2] = *b"BS";
const EXTRA_LEN: u16 = 8;
const HEADER_LEN: usize = 10 + 2 + EXTRA_LEN as usize;
const TRAILER_LEN: usize = 8;

/// Pick a block size for `total` uncompressed bytes spread over `threads`
///
/// `min(100 MiB, total / threads)`, never below [`MIN_BLOCK_SIZE`].
pub fn choose_block_size(total: u64, threads: usize) -> usize {
    let per_thread = total / threads.max(1) as u64;
    per_thread.clamp(MIN_BLOCK_SIZE as u64, MAX_BLOCK_SIZE as u64) as usize
}

/// Statistics for one compression or decompression pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompressionStats {
    /// Uncompressed bytes
    pub bytes_in: u64,
    /// Compressed bytes
    pub bytes_out: u64,
    /// Gzip members processed
    pub blocks: usize,
    /// Time spent, in milliseconds
    pub elapsed_ms: u64,
}

impl CompressionStats {
    /// Compressed size as a fraction of the uncompressed size
    pub fn compression_ratio(&self) -> f64 {
        if self.bytes_in == 0 {
            return 1.0;
        }
        self.bytes_out as f64 / self.bytes_in as f64
    }
}

fn thread_pool(threads: usize, role: &'static str) -> Result<rayon::ThreadPool> {
    Ok(rayon::ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .thread_name(move |i| format!("savearc-{}-{}", role, i))
        .build()?)
}

/// Compress one block into a complete gzip member
fn compress_member(data: &[u8], level: Compression) -> io::Result<Vec<u8>> {
    let mut deflater = DeflateEncoder::new(Vec::with_capacity(data.len() / 2 + 64), level);
    deflater.write_all(data)?;
    let payload = deflater.finish()?;

    let payload_len = u32::try_from(payload.len())
        .map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput, "compressed block exceeds 4 GiB")
        })?;
    let mut crc = Crc::new();
    crc.update(data);

    let mut member = Vec::with_capacity(HEADER_LEN + payload.len() + TRAILER_LEN);
    member.extend_from_slice(&GZIP_MAGIC);
    member.extend_from_slice(&[METHOD_DEFLATE, FLAG_EXTRA, 0, 0, 0, 0, 0, OS_UNKNOWN]);
    member.extend_from_slice(&EXTRA_LEN.to_le_bytes());
    member.extend_from_slice(&SUBFIELD_ID);
    member.extend_from_slice(&4u16.to_le_bytes());
    member.extend_from_slice(&payload_len.to_le_bytes());
    member.extend_from_slice(&payload);
    member.extend_from_slice(&crc.sum().to_le_bytes());
    member.extend_from_slice(&(data.len() as u32).to_le_bytes());
    Ok(member)
}

/// Writer that compresses fixed-size blocks in parallel
///
/// Full blocks are queued until one per worker is ready, then compressed
/// together and written in order. [`finish`](Self::finish) must be called to
/// emit the final partial block; dropping the encoder discards it.
pub struct BlockGzEncoder<W: Write> {
    writer: Option<W>,
    pool: rayon::ThreadPool,
    threads: usize,
    block_size: usize,
    buffer: Vec<u8>,
    queued: Vec<Vec<u8>>,
    stats: CompressionStats,
    started: Instant,
}

impl<W: Write> std::fmt::Debug for BlockGzEncoder<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockGzEncoder")
            .field("threads", &self.threads)
            .field("block_size", &self.block_size)
            .field("stats", &self.stats)
            .finish()
    }
}

impl<W: Write> BlockGzEncoder<W> {
    /// Create an encoder with `threads` workers and the given block size
    pub fn new(writer: W, threads: usize, block_size: usize) -> Result<Self> {
        let threads = threads.max(1);
        let block_size = block_size.max(1);
        Ok(Self {
            writer: Some(writer),
            pool: thread_pool(threads, "gzip")?,
            threads,
            block_size,
            buffer: Vec::with_capacity(block_size.min(MAX_BLOCK_SIZE)),
            queued: Vec::with_capacity(threads),
            stats: CompressionStats::default(),
            started: Instant::now(),
        })
    }

    fn compress_queued(&mut self) -> io::Result<()> {
        if self.queued.is_empty() {
            return Ok(());
        }
        let level = Compression::default();
        let blocks = std::mem::take(&mut self.queued);
        let members = self.pool.install(|| {
            blocks
                .par_iter()
                .map(|block| compress_member(block, level))
                .collect::<io::Result<Vec<_>>>()
        })?;

        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "encoder already finished"))?;
        for (block, member) in blocks.iter().zip(&members) {
            writer.write_all(member)?;
            self.stats.bytes_in += block.len() as u64;
            self.stats.bytes_out += member.len() as u64;
            self.stats.blocks += 1;
        }
        trace!("Wrote {} gzip members", members.len());
        Ok(())
    }

    fn queue_buffer(&mut self) -> io::Result<()> {
        let next = Vec::with_capacity(self.block_size.min(MAX_BLOCK_SIZE));
        let full = std::mem::replace(&mut self.buffer, next);
        self.queued.push(full);
        if self.queued.len() >= self.threads {
            self.compress_queued()?;
        }
        Ok(())
    }

    /// Compress everything left and return the writer with final statistics
    pub fn finish(mut self) -> Result<(W, CompressionStats)> {
        if !self.buffer.is_empty() || (self.stats.blocks == 0 && self.queued.is_empty()) {
            // an empty input still gets one member so the output is valid gzip
            let last = std::mem::take(&mut self.buffer);
            self.queued.push(last);
        }
        self.compress_queued()
            .map_err(|e| ArchiveError::compression(e.to_string()))?;

        let mut writer = self
            .writer
            .take()
            .ok_or_else(|| ArchiveError::internal("encoder already finished"))?;
        writer.flush()?;

        self.stats.elapsed_ms = self.started.elapsed().as_millis() as u64;
        debug!(
            "Compressed {} bytes into {} bytes in {} blocks",
            self.stats.bytes_in, self.stats.bytes_out, self.stats.blocks
        );
        Ok((writer, self.stats.clone()))
    }
}

impl<W: Write> Write for BlockGzEncoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.writer.is_none() {
            return Err(io::Error::new(io::ErrorKind::Other, "encoder already finished"));
        }

        let mut offset = 0;
        while offset < buf.len() {
            let room = self.block_size - self.buffer.len();
            let take = room.min(buf.len() - offset);
            self.buffer.extend_from_slice(&buf[offset..offset + take]);
            offset += take;

            if self.buffer.len() >= self.block_size {
                self.queue_buffer()?;
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        // partial blocks stay buffered; only the sink is flushed
        match self.writer.as_mut() {
            Some(writer) => writer.flush(),
            None => Err(io::Error::new(io::ErrorKind::Other, "encoder already finished")),
        }
    }
}

/// One member located by its `BS` subfield, still compressed
struct RawMember {
    payload: Vec<u8>,
    crc: u32,
    size: u32,
}

/// Parse a member header; `None` if it lacks the `BS` block subfield
fn parse_block_header(header: &[u8]) -> Option<u32> {
    if header.len() < HEADER_LEN
        || header[0..2] != GZIP_MAGIC
        || header[2] != METHOD_DEFLATE
        || header[3] != FLAG_EXTRA
        || u16::from_le_bytes([header[10], header[11]]) != EXTRA_LEN
        || header[12..14] != SUBFIELD_ID
        || u16::from_le_bytes([header[14], header[15]]) != 4
    {
        return None;
    }
    Some(u32::from_le_bytes([header[16], header[17], header[18], header[19]]))
}

fn inflate_member(member: &RawMember) -> io::Result<Vec<u8>> {
    let mut out = Vec::with_capacity(member.size as usize);
    DeflateDecoder::new(&member.payload[..]).read_to_end(&mut out)?;

    let mut crc = Crc::new();
    crc.update(&out);
    if crc.sum() != member.crc || out.len() as u32 != member.size {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "gzip member checksum mismatch"));
    }
    Ok(out)
}

/// Reader that inflates `BS`-indexed gzip members in parallel batches
pub struct BlockGzDecoder<R: Read> {
    reader: R,
    pool: rayon::ThreadPool,
    threads: usize,
    first_header: Option<Vec<u8>>,
    output: Vec<u8>,
    position: usize,
    finished: bool,
    stats: CompressionStats,
}

impl<R: Read> std::fmt::Debug for BlockGzDecoder<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockGzDecoder")
            .field("threads", &self.threads)
            .field("stats", &self.stats)
            .finish()
    }
}

impl<R: Read> BlockGzDecoder<R> {
    fn with_first_header(reader: R, header: Vec<u8>, threads: usize) -> Result<Self> {
        let threads = threads.max(1);
        Ok(Self {
            reader,
            pool: thread_pool(threads, "gunzip")?,
            threads,
            first_header: Some(header),
            output: Vec::new(),
            position: 0,
            finished: false,
            stats: CompressionStats::default(),
        })
    }

    fn next_member(&mut self) -> io::Result<Option<RawMember>> {
        let header = match self.first_header.take() {
            Some(header) => header,
            None => {
                let mut header = vec![0u8; HEADER_LEN];
                let got = read_up_to(&mut self.reader, &mut header)?;
                if got == 0 {
                    return Ok(None);
                }
                if got < HEADER_LEN {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "truncated gzip member header",
                    ));
                }
                header
            }
        };

        let payload_len = parse_block_header(&header).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidData, "gzip member without block index")
        })?;

        let mut payload = vec![0u8; payload_len as usize];
        self.reader.read_exact(&mut payload)?;
        let mut trailer = [0u8; TRAILER_LEN];
        self.reader.read_exact(&mut trailer)?;

        self.stats.bytes_out += (HEADER_LEN + payload.len() + TRAILER_LEN) as u64;
        Ok(Some(RawMember {
            payload,
            crc: u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]),
            size: u32::from_le_bytes([trailer[4], trailer[5], trailer[6], trailer[7]]),
        }))
    }

    fn fill_batch(&mut self) -> io::Result<()> {
        let mut batch = Vec::with_capacity(self.threads);
        while batch.len() < self.threads {
            match self.next_member()? {
                Some(member) => batch.push(member),
                None => {
                    self.finished = true;
                    break;
                }
            }
        }

        let blocks = self.pool.install(|| {
            batch
                .par_iter()
                .map(inflate_member)
                .collect::<io::Result<Vec<_>>>()
        })?;

        self.output.clear();
        self.position = 0;
        for block in blocks {
            self.stats.bytes_in += block.len() as u64;
            self.stats.blocks += 1;
            self.output.extend_from_slice(&block);
        }
        if self.finished {
            debug!(
                "Inflated {} bytes into {} bytes from {} blocks",
                self.stats.bytes_out, self.stats.bytes_in, self.stats.blocks
            );
        }
        Ok(())
    }
}

impl<R: Read> Read for BlockGzDecoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.position >= self.output.len() {
            if self.finished {
                return Ok(0);
            }
            self.fill_batch()?;
        }
        let n = buf.len().min(self.output.len() - self.position);
        buf[..n].copy_from_slice(&self.output[self.position..self.position + n]);
        self.position += n;
        Ok(n)
    }
}

/// Read until `buf` is full or the reader is exhausted
fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Wrap a gzip stream in the fastest decoder that can read it
///
/// Streams whose first member carries the `BS` index are inflated in parallel
/// on `threads` workers; anything else goes through a sequential
/// multi-member decoder.
pub fn decoder_for<R: Read + Send + 'static>(
    mut reader: R,
    threads: usize,
) -> Result<Box<dyn Read + Send>> {
    let mut header = vec![0u8; HEADER_LEN];
    let got = read_up_to(&mut reader, &mut header)?;
    header.truncate(got);

    if parse_block_header(&header).is_some() {
        debug!("Block-indexed gzip stream, inflating on {} workers", threads);
        Ok(Box::new(BlockGzDecoder::with_first_header(reader, header, threads)?))
    } else {
        debug!("Plain gzip stream, inflating sequentially");
        Ok(Box::new(MultiGzDecoder::new(Cursor::new(header).chain(reader))))
    }
}

/// Open a `.tar.gz` container for reading its uncompressed stream
pub fn open_container(path: &Path, threads: usize) -> Result<Box<dyn Read + Send>> {
    let file = File::open(path).map_err(|e| ArchiveError::io_at(path, e))?;
    decoder_for(BufReader::new(file), threads)
}
