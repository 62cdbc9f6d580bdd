#![cfg_attr(all(feature = "bpf", not(feature = "user")), no_std)]

//! Wire-format structs shared between the kernel-side producer and the
//! userspace codec. Every struct here is `repr(C)` and must stay
//! byte-for-byte compatible with the corresponding C struct emitted by the
//! tracepoint programs: field order, sizes and alignment are an ABI
//! contract, not an implementation detail.

use bytemuck::{Pod, Zeroable};

/// Fields common to every event variant, always the first bytes of a record.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
#[cfg_attr(feature = "user", derive(serde::Serialize, serde::Deserialize))]
pub struct CommonHeader {
    pub cgroup_id: u64,
    pub pid: u32,
    pub ppid: u32,
    pub uid: u32,
    pub gid: u32,
    pub comm: [u8; 16],
    pub pcomm: [u8; 16],
}

pub const FILENAME_LEN: usize = 128;
pub const ARGV_SLOTS: usize = 24;
pub const ARG_CHUNK_LEN: usize = 64;

// `OpenatRecord` does not derive serde: its `filename` field is a
// `[u8; 128]` array, and serde's blanket array impls only cover lengths
// 0..=32. It is consumed exclusively via `bytemuck::from_bytes` (see
// `codec.rs`), never serialized, so no serde impl is needed.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct OpenatRecord {
    pub common: CommonHeader,
    pub flags: i32,
    pub dfd: i32,
    pub ret: i32,
    pub filename: [u8; FILENAME_LEN],
    /// Trailing alignment padding a C compiler inserts to round the
    /// struct up to an 8-byte multiple; not a logical field.
    pub _pad: [u8; 4],
}

// Same reasoning as `OpenatRecord`: `filename`, `argv` and `envp` all
// exceed serde's 32-element array impl ceiling.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct ExecveRecord {
    pub common: CommonHeader,
    pub ret: i32,
    pub filename: [u8; FILENAME_LEN],
    pub argv: [[u8; ARG_CHUNK_LEN]; ARGV_SLOTS],
    pub envp: [[u8; ARG_CHUNK_LEN]; ARGV_SLOTS],
    pub _pad: [u8; 4],
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
#[cfg_attr(feature = "user", derive(serde::Serialize, serde::Deserialize))]
pub struct ConnectRecord {
    pub common: CommonHeader,
    pub ret: i32,
    pub fd: i32,
    pub ip: u32,
    pub port: u16,
    pub _pad: [u8; 2],
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
#[cfg_attr(feature = "user", derive(serde::Serialize, serde::Deserialize))]
pub struct AcceptRecord {
    pub common: CommonHeader,
    pub ret: i32,
    pub ip: u32,
    pub port: u16,
    pub _pad: [u8; 6],
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
#[cfg_attr(feature = "user", derive(serde::Serialize, serde::Deserialize))]
pub struct PtraceRecord {
    pub common: CommonHeader,
    pub ret: i32,
    pub _pad: i32,
    pub request: u64,
    pub target_pid: i32,
    pub _pad2: i32,
    pub addr: u64,
}

// `name` is a `[u8; 128]` array, over serde's 32-element impl ceiling --
// no serde derive, same as `OpenatRecord`.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct MemfdCreateRecord {
    pub common: CommonHeader,
    pub ret: i32,
    pub flags: u32,
    pub name: [u8; FILENAME_LEN],
}

// `filename` is a `[u8; 128]` array, over serde's 32-element impl
// ceiling -- no serde derive, same as `OpenatRecord`.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct ChmodRecord {
    pub common: CommonHeader,
    pub ret: i32,
    pub mode: u32,
    pub filename: [u8; FILENAME_LEN],
}

/// Tags identifying which ring buffer / record layout a channel carries.
/// Mirrors `linnix_ai_ebpf_common::EventType`'s closed-enum-of-wire-tags
/// pattern, one tag per syscall variant instead of per telemetry class.
#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Channel {
    Openat = 0,
    Execve = 1,
    Connect = 2,
    Accept = 3,
    Ptrace = 4,
    MemfdCreate = 5,
    Chmod = 6,
}

impl Channel {
    pub const ALL: [Channel; 7] = [
        Channel::Openat,
        Channel::Execve,
        Channel::Connect,
        Channel::Accept,
        Channel::Ptrace,
        Channel::MemfdCreate,
        Channel::Chmod,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Openat => "openat",
            Channel::Execve => "execve",
            Channel::Connect => "connect",
            Channel::Accept => "accept",
            Channel::Ptrace => "ptrace",
            Channel::MemfdCreate => "memfd_create",
            Channel::Chmod => "chmod",
        }
    }

    /// Ring buffer map name the producer is expected to expose for this
    /// channel (e.g. `EVENTS_OPENAT`). Kept in one place so the transport
    /// and any future producer stay in lockstep.
    pub fn map_name(self) -> &'static str {
        match self {
            Channel::Openat => "EVENTS_OPENAT",
            Channel::Execve => "EVENTS_EXECVE",
            Channel::Connect => "EVENTS_CONNECT",
            Channel::Accept => "EVENTS_ACCEPT",
            Channel::Ptrace => "EVENTS_PTRACE",
            Channel::MemfdCreate => "EVENTS_MEMFD_CREATE",
            Channel::Chmod => "EVENTS_CHMOD",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem::size_of;

    #[test]
    fn record_sizes_are_8_byte_aligned() {
        assert_eq!(size_of::<OpenatRecord>() % 8, 0);
        assert_eq!(size_of::<ExecveRecord>() % 8, 0);
        assert_eq!(size_of::<ConnectRecord>() % 8, 0);
        assert_eq!(size_of::<AcceptRecord>() % 8, 0);
        assert_eq!(size_of::<PtraceRecord>() % 8, 0);
        assert_eq!(size_of::<MemfdCreateRecord>() % 8, 0);
        assert_eq!(size_of::<ChmodRecord>() % 8, 0);
    }

    #[test]
    fn record_sizes_match_wire_contract() {
        assert_eq!(size_of::<OpenatRecord>(), 200);
        assert_eq!(size_of::<ExecveRecord>(), 3264);
        assert_eq!(size_of::<ConnectRecord>(), 72);
        assert_eq!(size_of::<AcceptRecord>(), 72);
        assert_eq!(size_of::<PtraceRecord>(), 88);
        assert_eq!(size_of::<MemfdCreateRecord>(), 192);
        assert_eq!(size_of::<ChmodRecord>(), 192);
    }

    #[test]
    fn common_header_is_56_bytes() {
        // 8 (cgroup_id) + 4*4 (pid/ppid/uid/gid) + 16 (comm) + 16 (pcomm)
        assert_eq!(size_of::<CommonHeader>(), 8 + 16 + 16 + 16);
    }

    #[test]
    fn execve_record_holds_24_chunks_of_64() {
        assert_eq!(size_of::<[[u8; ARG_CHUNK_LEN]; ARGV_SLOTS]>(), 24 * 64);
    }

    #[test]
    fn channel_all_covers_every_variant() {
        assert_eq!(Channel::ALL.len(), 7);
    }
}
