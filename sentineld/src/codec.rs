//! Bit-exact decode of kernel records into typed events, plus the string,
//! IPv4 and port normalisation the producer's raw layout requires.
//!
//! Every `decode_*` function takes an immutable byte slice whose length must
//! equal the declared fixed record size for that variant -- these are the
//! wire layouts in [`sentineld_wire`], the only contract shared with the
//! kernel-side producer.

use std::mem::size_of;

use thiserror::Error;

use sentineld_wire::{
    AcceptRecord, ChmodRecord, CommonHeader, ConnectRecord, ExecveRecord, MemfdCreateRecord,
    OpenatRecord, PtraceRecord,
};

use crate::event::{
    AcceptEvent, ChmodEvent, CommonFields, ConnectEvent, Event, ExecveEvent, MemfdCreateEvent,
    OpenatEvent, PtraceEvent,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("record too short: got {got} bytes, want {want}")]
    ShortRecord { got: usize, want: usize },
    #[error("record too long: got {got} bytes, want {want}")]
    OversizeRecord { got: usize, want: usize },
}

fn check_len(bytes: &[u8], want: usize) -> Result<(), DecodeError> {
    if bytes.len() < want {
        return Err(DecodeError::ShortRecord {
            got: bytes.len(),
            want,
        });
    }
    if bytes.len() > want {
        return Err(DecodeError::OversizeRecord {
            got: bytes.len(),
            want,
        });
    }
    Ok(())
}

/// First-NUL trim. No UTF-8 validation: invalid bytes are preserved via
/// lossy conversion so rule matching stays byte-wise, not codepoint-wise.
pub fn trim_nul(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Reconstruct the dotted quad by interpreting the wire `u32` in memory
/// order (little-endian on x86-64), matching the producer's historical byte
/// interpretation rather than standard network-order formatting.
pub fn ip_to_string(ip: u32) -> String {
    let bytes = ip.to_le_bytes();
    format!("{}.{}.{}.{}", bytes[0], bytes[1], bytes[2], bytes[3])
}

/// Swap a big-endian (network order) port into host order.
pub fn ntohs(port: u16) -> u16 {
    ((port << 8) & 0xff00) | ((port >> 8) & 0x00ff)
}

/// Walk an `argv`/`envp` chunk array, stopping at the first chunk whose
/// first byte is NUL (end-of-list marker). Never emits empty strings.
fn extract_args(chunks: &[[u8; 64]]) -> Vec<String> {
    let mut out = Vec::new();
    for chunk in chunks {
        if chunk[0] == 0 {
            break;
        }
        out.push(trim_nul(chunk));
    }
    out
}

fn common_fields(header: &CommonHeader) -> CommonFields {
    CommonFields {
        cgroup_id: header.cgroup_id,
        pid: header.pid,
        ppid: header.ppid,
        uid: header.uid,
        gid: header.gid,
        comm: trim_nul(&header.comm),
        pcomm: trim_nul(&header.pcomm),
    }
}

pub fn decode_openat(bytes: &[u8]) -> Result<Event, DecodeError> {
    check_len(bytes, size_of::<OpenatRecord>())?;
    let record: &OpenatRecord = bytemuck::from_bytes(bytes);
    Ok(Event::Openat(OpenatEvent {
        common: common_fields(&record.common),
        flags: record.flags,
        dfd: record.dfd,
        ret: record.ret,
        filename: trim_nul(&record.filename),
    }))
}

pub fn decode_execve(bytes: &[u8]) -> Result<Event, DecodeError> {
    check_len(bytes, size_of::<ExecveRecord>())?;
    let record: &ExecveRecord = bytemuck::from_bytes(bytes);
    Ok(Event::Execve(ExecveEvent {
        common: common_fields(&record.common),
        ret: record.ret,
        filename: trim_nul(&record.filename),
        argv: extract_args(&record.argv),
        envp: extract_args(&record.envp),
    }))
}

pub fn decode_connect(bytes: &[u8]) -> Result<Event, DecodeError> {
    check_len(bytes, size_of::<ConnectRecord>())?;
    let record: &ConnectRecord = bytemuck::from_bytes(bytes);
    Ok(Event::Connect(ConnectEvent {
        common: common_fields(&record.common),
        ret: record.ret,
        fd: record.fd,
        ip: ip_to_string(record.ip),
        port: ntohs(record.port),
    }))
}

pub fn decode_accept(bytes: &[u8]) -> Result<Event, DecodeError> {
    check_len(bytes, size_of::<AcceptRecord>())?;
    let record: &AcceptRecord = bytemuck::from_bytes(bytes);
    Ok(Event::Accept(AcceptEvent {
        common: common_fields(&record.common),
        ret: record.ret,
        ip: ip_to_string(record.ip),
        port: ntohs(record.port),
    }))
}

pub fn decode_ptrace(bytes: &[u8]) -> Result<Event, DecodeError> {
    check_len(bytes, size_of::<PtraceRecord>())?;
    let record: &PtraceRecord = bytemuck::from_bytes(bytes);
    Ok(Event::Ptrace(PtraceEvent {
        common: common_fields(&record.common),
        ret: record.ret,
        request: record.request,
        target_pid: record.target_pid,
        addr: record.addr,
    }))
}

pub fn decode_memfd_create(bytes: &[u8]) -> Result<Event, DecodeError> {
    check_len(bytes, size_of::<MemfdCreateRecord>())?;
    let record: &MemfdCreateRecord = bytemuck::from_bytes(bytes);
    Ok(Event::MemfdCreate(MemfdCreateEvent {
        common: common_fields(&record.common),
        ret: record.ret,
        flags: record.flags,
        name: trim_nul(&record.name),
    }))
}

pub fn decode_chmod(bytes: &[u8]) -> Result<Event, DecodeError> {
    check_len(bytes, size_of::<ChmodRecord>())?;
    let record: &ChmodRecord = bytemuck::from_bytes(bytes);
    Ok(Event::Chmod(ChmodEvent {
        common: common_fields(&record.common),
        ret: record.ret,
        mode: record.mode,
        filename: trim_nul(&record.filename),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentineld_wire::{ARGV_SLOTS, ARG_CHUNK_LEN, FILENAME_LEN};

    fn header(comm: &str, pcomm: &str) -> CommonHeader {
        let mut h = CommonHeader {
            cgroup_id: 7,
            pid: 42,
            ppid: 1,
            uid: 0,
            gid: 0,
            comm: [0u8; 16],
            pcomm: [0u8; 16],
        };
        h.comm[..comm.len()].copy_from_slice(comm.as_bytes());
        h.pcomm[..pcomm.len()].copy_from_slice(pcomm.as_bytes());
        h
    }

    #[test]
    fn decode_openat_trims_filename_and_comm() {
        let mut filename = [0u8; FILENAME_LEN];
        filename[.."/etc/shadow".len()].copy_from_slice(b"/etc/shadow");
        let record = OpenatRecord {
            common: header("cat", "bash"),
            flags: 0,
            dfd: -100,
            ret: 3,
            filename,
            _pad: [0; 4],
        };
        let bytes = bytemuck::bytes_of(&record);
        let event = decode_openat(bytes).unwrap();
        match event {
            Event::Openat(e) => {
                assert_eq!(e.filename, "/etc/shadow");
                assert_eq!(e.common.comm, "cat");
                assert_eq!(e.ret, 3);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn short_record_is_rejected() {
        let record = OpenatRecord {
            common: header("cat", "bash"),
            flags: 0,
            dfd: -100,
            ret: 3,
            filename: [0; FILENAME_LEN],
            _pad: [0; 4],
        };
        let bytes = bytemuck::bytes_of(&record);
        let err = decode_openat(&bytes[..bytes.len() - 1]).unwrap_err();
        assert_eq!(
            err,
            DecodeError::ShortRecord {
                got: bytes.len() - 1,
                want: bytes.len(),
            }
        );
    }

    #[test]
    fn oversize_record_is_rejected() {
        let record = OpenatRecord {
            common: header("cat", "bash"),
            flags: 0,
            dfd: -100,
            ret: 3,
            filename: [0; FILENAME_LEN],
            _pad: [0; 4],
        };
        let bytes = bytemuck::bytes_of(&record);
        let mut padded = bytes.to_vec();
        padded.push(0);
        let err = decode_openat(&padded).unwrap_err();
        assert_eq!(
            err,
            DecodeError::OversizeRecord {
                got: padded.len(),
                want: bytes.len(),
            }
        );
    }

    #[test]
    fn extract_args_stops_at_first_empty_chunk() {
        let mut argv = [[0u8; ARG_CHUNK_LEN]; ARGV_SLOTS];
        argv[0][.."ls".len()].copy_from_slice(b"ls");
        argv[1][.."-l".len()].copy_from_slice(b"-l");
        // argv[2..] left zeroed -> end of list
        assert_eq!(extract_args(&argv), vec!["ls".to_string(), "-l".to_string()]);
    }

    #[test]
    fn ip_to_string_uses_memory_byte_order() {
        // 127.0.0.1 encoded the way the producer emits it: 0x0100007f
        assert_eq!(ip_to_string(0x0100007f), "127.0.0.1");
    }

    #[test]
    fn ntohs_converts_network_to_host_order() {
        // 4444 decimal is 0x115C; network order bytes are 0x5C, 0x11
        assert_eq!(ntohs(0x5C11), 4444);
    }

    #[test]
    fn decode_connect_normalises_ip_and_port() {
        let record = ConnectRecord {
            common: header("curl", "bash"),
            ret: 0,
            fd: 5,
            ip: 0x0100007f,
            port: 0x5C11,
            _pad: [0; 2],
        };
        let bytes = bytemuck::bytes_of(&record);
        match decode_connect(bytes).unwrap() {
            Event::Connect(e) => {
                assert_eq!(e.ip, "127.0.0.1");
                assert_eq!(e.port, 4444);
            }
            _ => panic!("wrong variant"),
        }
    }
}
