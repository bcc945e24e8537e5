// This file is part of `bedrock`.
// See LICENSE for licensing information.

//! Two-party communication channels: a trait for reading and writing the
//! types the protocols care about, plus concrete channels over in-memory
//! readers/writers, Unix socket pairs, and TCP streams with receive
//! timeouts.

use crate::Block;
use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use std::{
    io::{BufReader, BufWriter, Read, Result, Write},
    net::TcpStream,
    os::unix::net::UnixStream,
    time::Duration,
};

/// A trait for managing I/O. `AbstractChannel`s provide basic read/write
/// capabilities for both common and protocol-specific types.
pub trait AbstractChannel {
    /// Read a slice of `u8`s from the channel.
    fn read_bytes(&mut self, bytes: &mut [u8]) -> Result<()>;
    /// Write a slice of `u8`s to the channel.
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()>;
    /// Flush the channel.
    fn flush(&mut self) -> Result<()>;

    /// Read `nbytes` from the channel, and return it as a `Vec`.
    fn read_vec(&mut self, nbytes: usize) -> Result<Vec<u8>> {
        let mut data = vec![0; nbytes];
        self.read_bytes(&mut data)?;
        Ok(data)
    }

    /// Write a `u8` to the channel.
    #[inline(always)]
    fn write_u8(&mut self, s: u8) -> Result<()> {
        self.write_bytes(&[s])
    }

    /// Read a `u8` from the channel.
    #[inline(always)]
    fn read_u8(&mut self) -> Result<u8> {
        let mut data = [0u8; 1];
        self.read_bytes(&mut data)?;
        Ok(data[0])
    }

    /// Write a `u32` to the channel.
    #[inline(always)]
    fn write_u32(&mut self, s: u32) -> Result<()> {
        self.write_bytes(&s.to_le_bytes())
    }

    /// Read a `u32` from the channel.
    #[inline(always)]
    fn read_u32(&mut self) -> Result<u32> {
        let mut data = [0u8; 4];
        self.read_bytes(&mut data)?;
        Ok(u32::from_le_bytes(data))
    }

    /// Write a `u64` to the channel.
    #[inline(always)]
    fn write_u64(&mut self, s: u64) -> Result<()> {
        self.write_bytes(&s.to_le_bytes())
    }

    /// Read a `u64` from the channel.
    #[inline(always)]
    fn read_u64(&mut self) -> Result<u64> {
        let mut data = [0u8; 8];
        self.read_bytes(&mut data)?;
        Ok(u64::from_le_bytes(data))
    }

    /// Write a `Block` to the channel.
    #[inline(always)]
    fn write_block(&mut self, b: &Block) -> Result<()> {
        self.write_bytes(&<[u8; 16]>::from(*b))
    }

    /// Read a `Block` from the channel.
    #[inline(always)]
    fn read_block(&mut self) -> Result<Block> {
        let mut data = [0u8; 16];
        self.read_bytes(&mut data)?;
        Ok(Block::from(data))
    }

    /// Write a Ristretto point to the channel in compressed form.
    #[inline(always)]
    fn write_pt(&mut self, pt: &RistrettoPoint) -> Result<()> {
        self.write_bytes(pt.compress().as_bytes())
    }

    /// Read a compressed Ristretto point from the channel.
    #[inline(always)]
    fn read_pt(&mut self) -> Result<RistrettoPoint> {
        let mut data = [0u8; 32];
        self.read_bytes(&mut data)?;
        CompressedRistretto::from_slice(&data)
            .ok()
            .and_then(|pt| pt.decompress())
            .ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::InvalidData, "invalid Ristretto point")
            })
    }
}

/// A channel wrapping a reader and a writer.
pub struct Channel<R, W> {
    reader: R,
    writer: W,
}

impl<R: Read, W: Write> Channel<R, W> {
    /// Make a new `Channel` from a `reader` and a `writer`.
    pub fn new(reader: R, writer: W) -> Self {
        Channel { reader, writer }
    }
}

impl<R: Read, W: Write> AbstractChannel for Channel<R, W> {
    #[inline(always)]
    fn read_bytes(&mut self, bytes: &mut [u8]) -> Result<()> {
        self.reader.read_exact(bytes)
    }

    #[inline(always)]
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes)
    }

    #[inline(always)]
    fn flush(&mut self) -> Result<()> {
        self.writer.flush()
    }
}

/// A `Channel` over a Unix socket.
pub type UnixChannel = Channel<BufReader<UnixStream>, BufWriter<UnixStream>>;

/// Convenience function to create a pair of `UnixChannel`s for local runs
/// and tests.
pub fn unix_channel_pair() -> Result<(UnixChannel, UnixChannel)> {
    let (tx, rx) = UnixStream::pair()?;
    let left = Channel::new(BufReader::new(tx.try_clone()?), BufWriter::new(tx));
    let right = Channel::new(BufReader::new(rx.try_clone()?), BufWriter::new(rx));
    Ok((left, right))
}

/// A buffered channel over a TCP stream with a bounded receive timeout.
pub struct TcpChannel {
    inner: Channel<BufReader<TcpStream>, BufWriter<TcpStream>>,
}

impl TcpChannel {
    /// Wrap `stream`, bounding every read and write by `timeout`.
    pub fn new(stream: TcpStream, timeout: Duration) -> Result<Self> {
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;
        let reader = BufReader::new(stream.try_clone()?);
        let writer = BufWriter::new(stream);
        Ok(TcpChannel {
            inner: Channel::new(reader, writer),
        })
    }
}

impl AbstractChannel for TcpChannel {
    #[inline(always)]
    fn read_bytes(&mut self, bytes: &mut [u8]) -> Result<()> {
        self.inner.read_bytes(bytes)
    }

    #[inline(always)]
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner.write_bytes(bytes)
    }

    #[inline(always)]
    fn flush(&mut self) -> Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let (mut left, mut right) = unix_channel_pair().unwrap();
        let handle = std::thread::spawn(move || {
            left.write_u32(1234).unwrap();
            left.write_u64(u64::MAX - 1).unwrap();
            left.write_block(&Block::from(99u128)).unwrap();
            left.flush().unwrap();
        });
        assert_eq!(right.read_u32().unwrap(), 1234);
        assert_eq!(right.read_u64().unwrap(), u64::MAX - 1);
        assert_eq!(right.read_block().unwrap(), Block::from(99u128));
        handle.join().unwrap();
    }

    #[test]
    fn test_point_roundtrip() {
        use curve25519_dalek::{constants::RISTRETTO_BASEPOINT_TABLE, scalar::Scalar};
        let (mut left, mut right) = unix_channel_pair().unwrap();
        let mut rng = rand::thread_rng();
        let s = Scalar::random(&mut rng);
        let pt = &s * RISTRETTO_BASEPOINT_TABLE;
        let handle = std::thread::spawn(move || {
            left.write_pt(&pt).unwrap();
            left.flush().unwrap();
            pt
        });
        let got = right.read_pt().unwrap();
        let sent = handle.join().unwrap();
        assert_eq!(got, sent);
    }
}
