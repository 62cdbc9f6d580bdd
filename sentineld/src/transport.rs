//! Transport setup (the C7 collaborator, kept opaque per its own contract):
//! loads the kernel-side bytecode, attaches it to the syscall tracepoints,
//! and hands back one ring-buffer reader per channel. Grounded on the
//! teacher's `init_ebpf`/`attach_tracepoint_internal` sequence, narrowed
//! from perf-array-per-CPU to one ring buffer per syscall variant to match
//! this pipeline's per-variant wire layouts.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;

use anyhow::Context;
use aya::Ebpf;
use aya::EbpfLoader;
use aya::maps::MapData;
use aya::maps::ring_buf::RingBuf;
use aya::programs::TracePoint;
use aya_log::EbpfLogger;
use log::{info, warn};

use sentineld_wire::Channel;

const BPF_OBJECT_ENV: &str = "SENTINELD_BPF_OBJECT";
const BPF_OBJECT_CANDIDATES: &[&str] = &[
    "/usr/local/share/sentineld/sentineld-ebpf.o",
    "target/bpfel-unknown-none/release/sentineld-ebpf",
    "./target/bpfel-unknown-none/release/sentineld-ebpf",
];

/// Syscall tracepoint each channel attaches to: `(program name, category, name)`.
/// One entry-point tracepoint per variant, matching one ring buffer each.
const TRACEPOINTS: &[(Channel, &str, &str, &str)] = &[
    (Channel::Openat, "trace_openat", "syscalls", "sys_enter_openat"),
    (Channel::Execve, "trace_execve", "syscalls", "sys_enter_execve"),
    (Channel::Connect, "trace_connect", "syscalls", "sys_enter_connect"),
    (Channel::Accept, "trace_accept", "syscalls", "sys_enter_accept"),
    (Channel::Ptrace, "trace_ptrace", "syscalls", "sys_enter_ptrace"),
    (
        Channel::MemfdCreate,
        "trace_memfd_create",
        "syscalls",
        "sys_enter_memfd_create",
    ),
    (Channel::Chmod, "trace_chmod", "syscalls", "sys_enter_chmod"),
];

fn read_bpf_bytes() -> anyhow::Result<Vec<u8>> {
    if let Ok(path) = env::var(BPF_OBJECT_ENV) {
        return fs::read(&path).with_context(|| format!("reading BPF object at {path}"));
    }
    for candidate in BPF_OBJECT_CANDIDATES {
        if Path::new(candidate).exists() {
            return fs::read(candidate).with_context(|| format!("reading BPF object at {candidate}"));
        }
    }
    anyhow::bail!(
        "BPF object not found; set {BPF_OBJECT_ENV} or install to /usr/local/share/sentineld/"
    )
}

fn attach_tracepoint(bpf: &mut Ebpf, program: &str, category: &str, name: &str) -> anyhow::Result<()> {
    let tp: &mut TracePoint = bpf
        .program_mut(program)
        .ok_or_else(|| anyhow::anyhow!("{program} program not found in BPF object"))?
        .try_into()?;
    tp.load()?;
    tp.attach(category, name)?;
    Ok(())
}

/// Owns the loaded BPF object and every ring-buffer reader derived from it.
/// Readers are exclusively owned here; pollers only ever see a borrowed
/// `RingBuf` for the lifetime of their task.
pub struct Transport {
    // Field order is the drop order (Rust drops struct fields top to
    // bottom): readers must go before the `Ebpf` guard they borrow from,
    // or teardown would close the producer while a reader is still live.
    readers: HashMap<Channel, RingBuf<MapData>>,
    _logger: Option<EbpfLogger>,
    _bpf: Ebpf,
}

impl Transport {
    /// Load the BPF object, attach every tracepoint, and take ownership of
    /// each channel's ring buffer. Any failure here is start-up-fatal.
    pub fn setup() -> anyhow::Result<Self> {
        let bytes = read_bpf_bytes()?;
        let mut bpf = EbpfLoader::new()
            .load(&bytes)
            .context("loading sentineld BPF object")?;

        let logger = match EbpfLogger::init(&mut bpf) {
            Ok(logger) => Some(logger),
            Err(err) => {
                warn!("BPF logger not active: {err}");
                None
            }
        };

        for (channel, program, category, name) in TRACEPOINTS {
            attach_tracepoint(&mut bpf, program, category, name)
                .with_context(|| format!("attaching {} tracepoint", channel.as_str()))?;
            info!("attached {} tracepoint ({program})", channel.as_str());
        }

        let mut readers = HashMap::with_capacity(Channel::ALL.len());
        for channel in Channel::ALL {
            let map = bpf
                .take_map(channel.map_name())
                .ok_or_else(|| anyhow::anyhow!("ring buffer map {} not found", channel.map_name()))?;
            let ring_buf = RingBuf::try_from(map)
                .with_context(|| format!("opening ring buffer {}", channel.map_name()))?;
            readers.insert(channel, ring_buf);
        }

        Ok(Self {
            readers,
            _logger: logger,
            _bpf: bpf,
        })
    }

    /// Take every channel's reader, handing ownership to the supervisor's
    /// pollers. Called exactly once during start-up.
    pub fn take_readers(&mut self) -> HashMap<Channel, RingBuf<MapData>> {
        std::mem::take(&mut self.readers)
    }
}

