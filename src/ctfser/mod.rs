//! CTF serializer (`ctfser`) — packet-oriented, bit-granular mmap writer
//! (spec.md §4.10, module J).
//!
//! Grounded on `original_source/ctfser/ctfser.c`: a writer that reserves
//! each packet's region with `fallocate`, maps it read-write, writes
//! bit-packed fields into the mapping, grows the reservation on overflow,
//! and truncates the file to the sum of *declared* packet sizes at
//! finalize time so growth headroom never leaks onto disk.
//!
//! `fd_cache` supplements this with the reuse scheme from
//! `original_source/fd-cache/fd-cache.c`: a writer can route readback
//! through a shared [`FdCache`] so repeat lookups of the same file dedup
//! to one open fd instead of each caller opening its own.

mod bits;
mod fd_cache;

use crate::error::GraphError;
use memmap2::MmapMut;
use nix::errno::Errno;
use nix::fcntl::{fallocate, FallocateFlags};
use nix::unistd::{ftruncate, sysconf, SysconfVar};
use std::fs::{File, OpenOptions};
use std::os::unix::io::AsFd;
use std::path::Path;

pub use bits::ByteOrder;
pub use fd_cache::{FdCache, FdHandle};

fn retry_eintr<T>(mut f: impl FnMut() -> nix::Result<T>) -> nix::Result<T> {
    loop {
        match f() {
            Err(Errno::EINTR) => continue,
            other => return other,
        }
    }
}

fn page_size() -> u64 {
    sysconf(SysconfVar::PAGE_SIZE)
        .ok()
        .flatten()
        .map(|v| v as u64)
        .unwrap_or(4096)
}

/// A stream file writer. Transitions to a poisoned state on any I/O
/// failure (spec.md §4.10 "Failure model"); every method after that
/// returns `IoError`.
pub struct CtfSerializer {
    path: std::path::PathBuf,
    file: File,
    grow_unit_bytes: u64,
    mmap_offset: u64,
    cur_packet_size_bytes: u64,
    prev_packet_size_bytes: u64,
    offset_in_cur_packet_bits: u64,
    stream_size_bytes: u64,
    base_mma: Option<MmapMut>,
    poisoned: bool,
}

impl CtfSerializer {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, GraphError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path.as_ref())?;
        Ok(CtfSerializer {
            path: path.as_ref().to_path_buf(),
            file,
            grow_unit_bytes: page_size() * 8,
            mmap_offset: 0,
            cur_packet_size_bytes: 0,
            prev_packet_size_bytes: 0,
            offset_in_cur_packet_bits: 0,
            stream_size_bytes: 0,
            base_mma: None,
            poisoned: false,
        })
    }

    fn check_poisoned(&self) -> Result<(), GraphError> {
        if self.poisoned {
            Err(GraphError::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                "serializer is poisoned after a prior I/O failure",
            )))
        } else {
            Ok(())
        }
    }

    fn poison(&mut self, err: std::io::Error) -> GraphError {
        self.poisoned = true;
        GraphError::IoError(err)
    }

    fn do_fallocate(&mut self, offset: u64, len: u64) -> Result<(), GraphError> {
        let fd = self.file.as_fd();
        retry_eintr(|| fallocate(fd, FallocateFlags::empty(), offset as i64, len as i64))
            .map_err(|errno| self.poison(std::io::Error::from(errno)))
    }

    fn remap(&mut self) -> Result<(), GraphError> {
        self.base_mma = None;
        // SAFETY: the mapped region was just reserved on this same file
        // via fallocate; no other writer mutates it concurrently (the
        // graph is single-threaded per spec.md §5).
        let mmap = unsafe {
            memmap2::MmapOptions::new()
                .offset(self.mmap_offset)
                .len(self.cur_packet_size_bytes as usize)
                .map_mut(&self.file)
        }
        .map_err(|e| self.poison(e))?;
        self.base_mma = Some(mmap);
        Ok(())
    }

    /// Opens a new packet (spec.md §4.10 "Open packet").
    pub fn open_packet(&mut self) -> Result<(), GraphError> {
        self.check_poisoned()?;
        self.base_mma = None;
        self.mmap_offset += self.prev_packet_size_bytes;
        self.prev_packet_size_bytes = 0;
        self.cur_packet_size_bytes = self.grow_unit_bytes;
        self.do_fallocate(self.mmap_offset, self.cur_packet_size_bytes)?;
        self.remap()?;
        self.offset_in_cur_packet_bits = 0;
        Ok(())
    }

    /// Grows the current packet's reservation (spec.md §4.10 "Grow packet").
    fn grow_packet(&mut self) -> Result<(), GraphError> {
        self.base_mma = None;
        self.cur_packet_size_bytes += self.grow_unit_bytes;
        self.do_fallocate(self.mmap_offset, self.cur_packet_size_bytes)?;
        self.remap()
    }

    fn ensure_capacity_bits(&mut self, bits_needed: u64) -> Result<(), GraphError> {
        while self.offset_in_cur_packet_bits + bits_needed > self.cur_packet_size_bytes * 8 {
            self.grow_packet()?;
        }
        Ok(())
    }

    fn align_to_bits(&mut self, align_bits: u64) -> Result<(), GraphError> {
        if align_bits <= 1 {
            return Ok(());
        }
        let rem = self.offset_in_cur_packet_bits % align_bits;
        if rem != 0 {
            let pad = align_bits - rem;
            self.ensure_capacity_bits(pad)?;
            self.offset_in_cur_packet_bits += pad;
        }
        Ok(())
    }

    fn mmap_mut(&mut self) -> Result<&mut [u8], GraphError> {
        self.base_mma
            .as_mut()
            .map(|m| &mut m[..])
            .ok_or_else(|| GraphError::IoError(std::io::Error::new(std::io::ErrorKind::Other, "no open packet")))
    }

    /// Writes an unsigned integer of `bit_width` (1..=64) bits at the
    /// current cursor, aligned to `align_bits` first.
    pub fn write_unsigned_bits(
        &mut self,
        value: u64,
        bit_width: u8,
        align_bits: u64,
        order: ByteOrder,
    ) -> Result<(), GraphError> {
        self.check_poisoned()?;
        self.align_to_bits(align_bits)?;
        self.ensure_capacity_bits(bit_width as u64)?;
        let pos = self.offset_in_cur_packet_bits;
        let buf = self.mmap_mut()?;
        bits::write_bits(buf, pos, value, bit_width, order);
        self.offset_in_cur_packet_bits += bit_width as u64;
        Ok(())
    }

    pub fn write_signed_bits(
        &mut self,
        value: i64,
        bit_width: u8,
        align_bits: u64,
        order: ByteOrder,
    ) -> Result<(), GraphError> {
        let mask = if bit_width == 64 {
            u64::MAX
        } else {
            (1u64 << bit_width) - 1
        };
        self.write_unsigned_bits((value as u64) & mask, bit_width, align_bits, order)
    }

    pub fn write_f32(&mut self, value: f32, order: ByteOrder) -> Result<(), GraphError> {
        self.write_unsigned_bits(value.to_bits() as u64, 32, 32, order)
    }

    pub fn write_f64(&mut self, value: f64, order: ByteOrder) -> Result<(), GraphError> {
        self.write_unsigned_bits(value.to_bits(), 64, 64, order)
    }

    /// Writes a fixed-size byte array, byte-aligned.
    pub fn write_fixed_char_array(&mut self, bytes: &[u8]) -> Result<(), GraphError> {
        self.check_poisoned()?;
        self.align_to_bits(8)?;
        self.ensure_capacity_bits(bytes.len() as u64 * 8)?;
        let pos_bytes = (self.offset_in_cur_packet_bits / 8) as usize;
        let buf = self.mmap_mut()?;
        buf[pos_bytes..pos_bytes + bytes.len()].copy_from_slice(bytes);
        self.offset_in_cur_packet_bits += bytes.len() as u64 * 8;
        Ok(())
    }

    /// Writes a zero-terminated string, byte-aligned.
    pub fn write_cstr(&mut self, s: &str) -> Result<(), GraphError> {
        self.check_poisoned()?;
        self.align_to_bits(8)?;
        let total = s.len() + 1;
        self.ensure_capacity_bits(total as u64 * 8)?;
        let pos_bytes = (self.offset_in_cur_packet_bits / 8) as usize;
        let buf = self.mmap_mut()?;
        buf[pos_bytes..pos_bytes + s.len()].copy_from_slice(s.as_bytes());
        buf[pos_bytes + s.len()] = 0;
        self.offset_in_cur_packet_bits += total as u64 * 8;
        Ok(())
    }

    /// Absolute-offset write into the still-mapped current packet, for
    /// rewriting header fields (content/packet size) before closing
    /// (spec.md §4.10 "Close packet").
    pub fn write_at(&mut self, byte_offset: u64, data: &[u8]) -> Result<(), GraphError> {
        self.check_poisoned()?;
        let buf = self.mmap_mut()?;
        let start = byte_offset as usize;
        if start + data.len() > buf.len() {
            return Err(GraphError::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                "write_at out of bounds of the current packet mapping",
            )));
        }
        buf[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    pub fn offset_in_cur_packet_bits(&self) -> u64 {
        self.offset_in_cur_packet_bits
    }

    /// Closes the current packet at its declared size (spec.md §4.10).
    pub fn close_packet(&mut self, declared_size_bytes: u64) -> Result<(), GraphError> {
        self.check_poisoned()?;
        self.prev_packet_size_bytes = declared_size_bytes;
        self.stream_size_bytes += declared_size_bytes;
        Ok(())
    }

    /// Truncates the file to the sum of declared packet sizes, unmaps,
    /// and closes the fd (spec.md §4.10 "Finalize writer").
    pub fn finalize(mut self) -> Result<(), GraphError> {
        self.check_poisoned()?;
        self.base_mma = None;
        let fd = self.file.as_fd();
        retry_eintr(|| ftruncate(fd, self.stream_size_bytes as i64))
            .map_err(|errno| self.poison(std::io::Error::from(errno)))?;
        Ok(())
    }

    /// Opens a read-only view of the file this serializer is writing,
    /// routed through `cache` so repeat callers (readback/verification
    /// running alongside the writer) share one fd per (device, inode)
    /// instead of each opening their own — the fd-cache-style reuse
    /// `SPEC_FULL.md` §1 supplements the writer with.
    pub fn open_via_cache(&self, cache: &FdCache) -> Result<FdHandle, GraphError> {
        cache.get_handle(&self.path)
    }

    pub fn stream_size_bytes(&self) -> u64 {
        self.stream_size_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn e3_round_trip_scenario() {
        let tmp = NamedTempFile::new().unwrap();
        let mut ser = CtfSerializer::create(tmp.path()).unwrap();
        ser.open_packet().unwrap();
        ser.write_unsigned_bits(0b101, 3, 1, ByteOrder::LittleEndian).unwrap();
        ser.write_unsigned_bits(0xDEADBEEF, 32, 16, ByteOrder::BigEndian).unwrap();
        ser.close_packet(8).unwrap();
        ser.finalize().unwrap();

        let bytes = std::fs::read(tmp.path()).unwrap();
        assert_eq!(bytes.len(), 8, "file truncated to declared packet size");

        let v1 = bits::read_bits(&bytes, 0, 3, ByteOrder::LittleEndian);
        assert_eq!(v1, 0b101);
        let v2 = bits::read_bits(&bytes, 16, 32, ByteOrder::BigEndian);
        assert_eq!(v2, 0xDEADBEEF);
    }

    #[test]
    fn open_via_cache_shares_one_fd_across_two_lookups() {
        let tmp = NamedTempFile::new().unwrap();
        let mut ser = CtfSerializer::create(tmp.path()).unwrap();
        ser.open_packet().unwrap();
        ser.close_packet(0).unwrap();
        ser.finalize().unwrap();

        let ser = CtfSerializer::create(tmp.path()).unwrap();
        let cache = FdCache::new();
        let a = ser.open_via_cache(&cache).unwrap();
        let b = ser.open_via_cache(&cache).unwrap();
        assert_eq!(cache.len(), 1, "both lookups dedup to one cache entry");
        drop(a);
        drop(b);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn growth_headroom_does_not_leak_onto_disk() {
        let tmp = NamedTempFile::new().unwrap();
        let mut ser = CtfSerializer::create(tmp.path()).unwrap();
        ser.open_packet().unwrap();
        // Force at least one grow by writing past the initial reservation.
        for i in 0..(page_size() * 8 + 64) / 8 {
            ser.write_unsigned_bits(i & 0xFF, 8, 8, ByteOrder::LittleEndian).unwrap();
        }
        let declared = ser.offset_in_cur_packet_bits() / 8;
        ser.close_packet(declared).unwrap();
        ser.finalize().unwrap();
        let bytes = std::fs::read(tmp.path()).unwrap();
        assert_eq!(bytes.len() as u64, declared);
    }
}
