//! The SPSC ring itself: a fixed-size header followed by `capacity *
//! frame_size` bytes of frame storage, backed by a named shared-memory
//! region (a file under `/dev/shm`, memory-mapped with `memmap2`).
//!
//! One producer task and one consumer task share a channel; there is no
//! locking on the hot path, only 32-bit atomics on the header indices
//! with acquire/release ordering. `write_idx`/`read_idx` grow
//! monotonically modulo `2 * capacity`; the occupied slot count is their
//! wrapping difference.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use memmap2::MmapMut;

use crate::error::{Result, ShmError};

const MAGIC: u32 = 0x4150_4148; // "APAH" (ap_ channel header)
const VERSION: u32 = 1;

/// Byte layout of the header region. All fields are plain `u32`s so the
/// mutable ones can be reinterpreted as `AtomicU32` in place -- the mmap
/// base is page-aligned, so every 4-byte-aligned offset within it is too.
#[repr(C)]
struct HeaderLayout {
    magic: u32,
    version: u32,
    call_id: u32,
    capacity: u32,
    frame_size: u32,
    write_idx: u32,
    read_idx: u32,
    dropped_frames: u32,
}

const HEADER_SIZE: usize = std::mem::size_of::<HeaderLayout>();

const OFF_MAGIC: usize = 0;
const OFF_VERSION: usize = 4;
const OFF_CALL_ID: usize = 8;
const OFF_CAPACITY: usize = 12;
const OFF_FRAME_SIZE: usize = 16;
const OFF_WRITE_IDX: usize = 20;
const OFF_READ_IDX: usize = 24;
const OFF_DROPPED: usize = 28;

/// The role a handle was opened under. Advisory only: using a producer
/// handle to read, or vice versa, is a programming error surfaced via a
/// debug assertion, not a runtime failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Producer,
    Consumer,
}

/// Outcome of a raw, non-evicting write attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    Written,
    Full,
}

#[derive(Debug)]
pub struct ShmChannel {
    mmap: MmapMut,
    capacity: u32,
    frame_size: u32,
    role: Option<Role>,
    path: PathBuf,
}

impl ShmChannel {
    /// Create (zero-initialized) or open an existing named region.
    ///
    /// Channel names follow `/ap_in_<id>` / `/ap_out_<id>`; `name` should
    /// already include that prefix, `create_or_open` just resolves it to a
    /// backing file path.
    pub fn create_or_open(
        name: &str,
        call_id: u32,
        capacity: u32,
        frame_size: u32,
        create: bool,
    ) -> Result<Self> {
        let path = shm_path(name);
        let total_size = HEADER_SIZE as u64 + (capacity as u64 * frame_size as u64);

        if create {
            if path.exists() {
                return Err(ShmError::AlreadyExists(name.to_string()));
            }
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(&path)
                .map_err(|e| ShmError::Io(name.to_string(), e))?;
            file.set_len(total_size)
                .map_err(|e| ShmError::Io(name.to_string(), e))?;
            let mut mmap = unsafe {
                MmapMut::map_mut(&file).map_err(|e| ShmError::Io(name.to_string(), e))?
            };
            mmap[..HEADER_SIZE].fill(0);
            write_u32(&mut mmap, OFF_MAGIC, MAGIC);
            write_u32(&mut mmap, OFF_VERSION, VERSION);
            write_u32(&mut mmap, OFF_CALL_ID, call_id);
            write_u32(&mut mmap, OFF_CAPACITY, capacity);
            write_u32(&mut mmap, OFF_FRAME_SIZE, frame_size);
            write_u32(&mut mmap, OFF_WRITE_IDX, 0);
            write_u32(&mut mmap, OFF_READ_IDX, 0);
            write_u32(&mut mmap, OFF_DROPPED, 0);

            Ok(Self {
                mmap,
                capacity,
                frame_size,
                role: None,
                path,
            })
        } else {
            if !path.exists() {
                return Err(ShmError::NotFound(name.to_string()));
            }
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .open(&path)
                .map_err(|e| ShmError::Io(name.to_string(), e))?;
            let mmap = unsafe {
                MmapMut::map_mut(&file).map_err(|e| ShmError::Io(name.to_string(), e))?
            };
            if mmap.len() < HEADER_SIZE {
                return Err(ShmError::IncompatibleHeader(name.to_string()));
            }
            let existing_magic = read_u32(&mmap, OFF_MAGIC);
            let existing_version = read_u32(&mmap, OFF_VERSION);
            let existing_capacity = read_u32(&mmap, OFF_CAPACITY);
            let existing_frame_size = read_u32(&mmap, OFF_FRAME_SIZE);
            if existing_magic != MAGIC
                || existing_version != VERSION
                || existing_capacity != capacity
                || existing_frame_size != frame_size
            {
                return Err(ShmError::IncompatibleHeader(name.to_string()));
            }

            Ok(Self {
                mmap,
                capacity,
                frame_size,
                role: None,
                path,
            })
        }
    }

    pub fn set_role_producer(&mut self) {
        self.role = Some(Role::Producer);
    }

    pub fn set_role_consumer(&mut self) {
        self.role = Some(Role::Consumer);
    }

    pub fn call_id(&self) -> u32 {
        read_u32(&self.mmap, OFF_CALL_ID)
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn frame_size(&self) -> u32 {
        self.frame_size
    }

    pub fn dropped_frames(&self) -> u32 {
        self.atomic(OFF_DROPPED).load(Ordering::Relaxed)
    }

    fn atomic(&self, offset: usize) -> &AtomicU32 {
        debug_assert!(offset + 4 <= self.mmap.len());
        let ptr = self.mmap.as_ptr().wrapping_add(offset) as *const AtomicU32;
        unsafe { &*ptr }
    }

    fn slot_offset(&self, idx: u32) -> usize {
        let slot = (idx % self.capacity) as usize;
        HEADER_SIZE + slot * self.frame_size as usize
    }

    fn occupied(&self, write_idx: u32, read_idx: u32) -> u32 {
        let modulus = 2 * self.capacity;
        ((write_idx + modulus) - read_idx) % modulus
    }

    /// Raw, non-evicting write. Returns `Full` when no free slot exists;
    /// the caller decides whether to drop or retry. `write_frame` below
    /// layers a drop-oldest backpressure policy on top.
    pub fn try_write_frame(&mut self, bytes: &[u8]) -> WriteStatus {
        debug_assert_ne!(self.role, Some(Role::Consumer), "producer op on consumer handle");
        debug_assert_eq!(bytes.len(), self.frame_size as usize);

        let write_idx = self.atomic(OFF_WRITE_IDX).load(Ordering::Relaxed);
        let read_idx = self.atomic(OFF_READ_IDX).load(Ordering::Acquire);
        if self.occupied(write_idx, read_idx) >= self.capacity {
            return WriteStatus::Full;
        }

        let offset = self.slot_offset(write_idx);
        self.mmap[offset..offset + bytes.len()].copy_from_slice(bytes);

        let next = (write_idx + 1) % (2 * self.capacity);
        self.atomic(OFF_WRITE_IDX).store(next, Ordering::Release);
        WriteStatus::Written
    }

    /// Write a frame, evicting the oldest unread frame on overflow
    /// (continuity of recent audio preferred over strict FIFO). Returns
    /// `true` if an eviction occurred.
    pub fn write_frame(&mut self, bytes: &[u8]) -> bool {
        if self.try_write_frame(bytes) == WriteStatus::Written {
            return false;
        }
        // Drop the oldest unread frame and retry exactly once -- a
        // single producer can only be one frame behind a full ring.
        let read_idx = self.atomic(OFF_READ_IDX).load(Ordering::Relaxed);
        let next_read = (read_idx + 1) % (2 * self.capacity);
        self.atomic(OFF_READ_IDX).store(next_read, Ordering::Release);
        self.atomic(OFF_DROPPED).fetch_add(1, Ordering::Relaxed);

        let status = self.try_write_frame(bytes);
        debug_assert_eq!(status, WriteStatus::Written);
        true
    }

    /// Non-blocking read; `None` if the ring is empty.
    pub fn read_frame(&mut self) -> Option<Vec<u8>> {
        debug_assert_ne!(self.role, Some(Role::Producer), "consumer op on producer handle");

        let write_idx = self.atomic(OFF_WRITE_IDX).load(Ordering::Acquire);
        let read_idx = self.atomic(OFF_READ_IDX).load(Ordering::Relaxed);
        if self.occupied(write_idx, read_idx) == 0 {
            return None;
        }

        let offset = self.slot_offset(read_idx);
        let frame = self.mmap[offset..offset + self.frame_size as usize].to_vec();

        let next = (read_idx + 1) % (2 * self.capacity);
        self.atomic(OFF_READ_IDX).store(next, Ordering::Release);
        Some(frame)
    }

    /// Remove the backing file. Called by the channel's owner (the
    /// telephony process) on call teardown; processors that only opened
    /// the channel leave removal to the owner.
    pub fn unlink(name: &str) -> std::io::Result<()> {
        let path = shm_path(name);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

fn shm_dir() -> PathBuf {
    let dev_shm = Path::new("/dev/shm");
    if dev_shm.is_dir() {
        dev_shm.to_path_buf()
    } else {
        std::env::temp_dir()
    }
}

fn shm_path(name: &str) -> PathBuf {
    // `name` arrives as e.g. "/ap_in_7"; strip the leading slash so it
    // becomes a plain file name under the shm directory.
    let trimmed = name.trim_start_matches('/');
    shm_dir().join(trimmed)
}

fn read_u32(mmap: &MmapMut, offset: usize) -> u32 {
    u32::from_ne_bytes(mmap[offset..offset + 4].try_into().unwrap())
}

fn write_u32(mmap: &mut MmapMut, offset: usize, value: u32) {
    mmap[offset..offset + 4].copy_from_slice(&value.to_ne_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_name(tag: &str) -> String {
        format!(
            "/ap_test_{tag}_{}_{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        )
    }

    #[test]
    fn write_then_read_round_trips_one_frame() {
        let name = unique_name("rw");
        let mut ch = ShmChannel::create_or_open(&name, 7, 4, 8, true).unwrap();
        ch.set_role_producer();
        let frame = vec![1u8; 8];
        assert_eq!(ch.try_write_frame(&frame), WriteStatus::Written);
        ch.set_role_consumer();
        assert_eq!(ch.read_frame(), Some(frame));
        assert_eq!(ch.read_frame(), None);
        ShmChannel::unlink(&name).unwrap();
    }

    #[test]
    fn open_without_create_requires_existing_region() {
        let name = unique_name("missing");
        let err = ShmChannel::create_or_open(&name, 1, 4, 8, false).unwrap_err();
        assert!(matches!(err, ShmError::NotFound(_)));
    }

    #[test]
    fn create_refuses_to_clobber_an_existing_region() {
        let name = unique_name("dup-create");
        let _first = ShmChannel::create_or_open(&name, 2, 4, 8, true).unwrap();
        let err = ShmChannel::create_or_open(&name, 2, 4, 8, true).unwrap_err();
        assert!(matches!(err, ShmError::AlreadyExists(_)));
        ShmChannel::unlink(&name).unwrap();
    }

    #[test]
    fn full_ring_drops_oldest_frame_and_counts_it() {
        let name = unique_name("evict");
        let mut ch = ShmChannel::create_or_open(&name, 1, 2, 4, true).unwrap();
        ch.write_frame(&[1, 1, 1, 1]);
        ch.write_frame(&[2, 2, 2, 2]);
        assert_eq!(ch.dropped_frames(), 0);
        let evicted = ch.write_frame(&[3, 3, 3, 3]);
        assert!(evicted);
        assert_eq!(ch.dropped_frames(), 1);
        // The oldest frame (1,1,1,1) was evicted; only 2 and 3 remain.
        assert_eq!(ch.read_frame(), Some(vec![2, 2, 2, 2]));
        assert_eq!(ch.read_frame(), Some(vec![3, 3, 3, 3]));
        assert_eq!(ch.read_frame(), None);
        ShmChannel::unlink(&name).unwrap();
    }

    #[test]
    fn second_handle_opens_the_same_region() {
        let name = unique_name("shared");
        let mut producer = ShmChannel::create_or_open(&name, 3, 4, 2, true).unwrap();
        producer.write_frame(&[9, 9]);
        let mut consumer = ShmChannel::create_or_open(&name, 3, 4, 2, false).unwrap();
        assert_eq!(consumer.read_frame(), Some(vec![9, 9]));
        ShmChannel::unlink(&name).unwrap();
    }
}
