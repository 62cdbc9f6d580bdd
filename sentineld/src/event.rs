//! The field-accessor layer (C2): a uniform `(type, field-name) -> value`
//! view over every event variant, used by the rule engine so rules can stay
//! data (a string field name) instead of one match arm per variant.

use std::fmt;

/// Fields present in every variant's common header, already trimmed and
/// decoded by the codec.
#[derive(Debug, Clone)]
pub struct CommonFields {
    pub cgroup_id: u64,
    pub pid: u32,
    pub ppid: u32,
    pub uid: u32,
    pub gid: u32,
    pub comm: String,
    pub pcomm: String,
}

#[derive(Debug, Clone)]
pub struct OpenatEvent {
    pub common: CommonFields,
    pub flags: i32,
    pub dfd: i32,
    pub ret: i32,
    pub filename: String,
}

#[derive(Debug, Clone)]
pub struct ExecveEvent {
    pub common: CommonFields,
    pub ret: i32,
    pub filename: String,
    pub argv: Vec<String>,
    pub envp: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ConnectEvent {
    pub common: CommonFields,
    pub ret: i32,
    pub fd: i32,
    pub ip: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct AcceptEvent {
    pub common: CommonFields,
    pub ret: i32,
    pub ip: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct PtraceEvent {
    pub common: CommonFields,
    pub ret: i32,
    pub request: u64,
    pub target_pid: i32,
    pub addr: u64,
}

#[derive(Debug, Clone)]
pub struct MemfdCreateEvent {
    pub common: CommonFields,
    pub ret: i32,
    pub flags: u32,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct ChmodEvent {
    pub common: CommonFields,
    pub ret: i32,
    pub mode: u32,
    pub filename: String,
}

#[derive(Debug, Clone)]
pub enum Event {
    Openat(OpenatEvent),
    Execve(ExecveEvent),
    Connect(ConnectEvent),
    Accept(AcceptEvent),
    Ptrace(PtraceEvent),
    MemfdCreate(MemfdCreateEvent),
    Chmod(ChmodEvent),
}

/// A field value as seen by the rule engine. Rule comparisons stringify
/// both sides (see `rules::compare`), but the underlying type is kept so
/// numeric operators can parse it without an intermediate round-trip.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Int(i64),
    Str(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Int(v) => write!(f, "{v}"),
            FieldValue::Str(v) => write!(f, "{v}"),
        }
    }
}

/// Uniform interface every event variant (and the path-enriched wrapper)
/// presents to the rule engine.
pub trait EventView {
    fn event_type(&self) -> &'static str;
    fn field(&self, name: &str) -> Option<FieldValue>;

    fn common(&self) -> &CommonFields;
}

fn common_field(common: &CommonFields, name: &str) -> Option<FieldValue> {
    match name {
        "proc.pid" => Some(FieldValue::Int(common.pid as i64)),
        "proc.ppid" => Some(FieldValue::Int(common.ppid as i64)),
        "proc.uid" => Some(FieldValue::Int(common.uid as i64)),
        "proc.gid" => Some(FieldValue::Int(common.gid as i64)),
        "proc.cgroup" => Some(FieldValue::Int(common.cgroup_id as i64)),
        "proc.name" => Some(FieldValue::Str(common.comm.clone())),
        "proc.pname" => Some(FieldValue::Str(common.pcomm.clone())),
        _ => None,
    }
}

/// Classic open(2) flag bits, decoded into the mnemonics the rule language
/// matches against. Order matches the access-mode triad first, then the
/// modifier bits, joined by `,`.
const O_ACCMODE: i32 = 0o3;
const O_RDONLY: i32 = 0o0;
const O_WRONLY: i32 = 0o1;
const O_RDWR: i32 = 0o2;
const OPEN_MODIFIER_FLAGS: &[(i32, &str)] = &[
    (0o100, "O_CREAT"),
    (0o200, "O_EXCL"),
    (0o400, "O_NOCTTY"),
    (0o1000, "O_TRUNC"),
    (0o2000, "O_APPEND"),
    (0o4000, "O_NONBLOCK"),
    (0o10000, "O_DSYNC"),
    (0o4010000, "O_SYNC"),
    (0o2000000, "O_CLOEXEC"),
];

fn decode_open_flags(flags: i32) -> String {
    let mut parts = Vec::new();
    parts.push(match flags & O_ACCMODE {
        O_WRONLY => "O_WRONLY",
        O_RDWR => "O_RDWR",
        O_RDONLY => "O_RDONLY",
        _ => unreachable!("O_ACCMODE masks to one of the three modes"),
    });
    for &(bit, name) in OPEN_MODIFIER_FLAGS {
        if flags & bit == bit {
            parts.push(name);
        }
    }
    parts.join(",")
}

/// The classic ptrace(2) request codes plus the `PTRACE_SETOPTIONS..`
/// extended range, mapped to mnemonics for rule matching.
fn ptrace_mnemonic(request: u64) -> Option<&'static str> {
    match request {
        0 => Some("PTRACE_TRACEME"),
        1 => Some("PTRACE_PEEKTEXT"),
        2 => Some("PTRACE_PEEKDATA"),
        3 => Some("PTRACE_PEEKUSER"),
        4 => Some("PTRACE_POKETEXT"),
        5 => Some("PTRACE_POKEDATA"),
        6 => Some("PTRACE_POKEUSER"),
        7 => Some("PTRACE_CONT"),
        8 => Some("PTRACE_KILL"),
        9 => Some("PTRACE_SINGLESTEP"),
        16 => Some("PTRACE_ATTACH"),
        17 => Some("PTRACE_DETACH"),
        24 => Some("PTRACE_SYSCALL"),
        0x4200 => Some("PTRACE_SETOPTIONS"),
        0x4201 => Some("PTRACE_GETEVENTMSG"),
        0x4202 => Some("PTRACE_GETSIGINFO"),
        0x4203 => Some("PTRACE_SETSIGINFO"),
        0x4206 => Some("PTRACE_SEIZE"),
        0x4207 => Some("PTRACE_INTERRUPT"),
        0x4208 => Some("PTRACE_LISTEN"),
        0x4204 => Some("PTRACE_GETREGSET"),
        0x4205 => Some("PTRACE_SETREGSET"),
        _ => None,
    }
}

impl EventView for OpenatEvent {
    fn event_type(&self) -> &'static str {
        "openat"
    }

    fn common(&self) -> &CommonFields {
        &self.common
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        if let Some(v) = common_field(&self.common, name) {
            return Some(v);
        }
        match name {
            "fd.name" => Some(FieldValue::Str(self.filename.clone())),
            "evt.arg.filename" => Some(FieldValue::Str(self.filename.clone())),
            "evt.arg.flags" => Some(FieldValue::Str(decode_open_flags(self.flags))),
            "evt.res" => Some(FieldValue::Int(self.ret as i64)),
            "fd.num" => Some(FieldValue::Int(self.ret as i64)),
            _ => None,
        }
    }
}

impl EventView for ExecveEvent {
    fn event_type(&self) -> &'static str {
        "execve"
    }

    fn common(&self) -> &CommonFields {
        &self.common
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        if let Some(v) = common_field(&self.common, name) {
            return Some(v);
        }
        match name {
            "proc.exepath" => Some(FieldValue::Str(self.filename.clone())),
            "evt.arg.filename" => Some(FieldValue::Str(self.filename.clone())),
            "proc.cmdline" => Some(FieldValue::Str(self.argv.join(" "))),
            "proc.args" => Some(FieldValue::Str(self.argv.join(" "))),
            "proc.env" => Some(FieldValue::Str(self.envp.join(" "))),
            "evt.res" => Some(FieldValue::Int(self.ret as i64)),
            _ => None,
        }
    }
}

impl EventView for ConnectEvent {
    fn event_type(&self) -> &'static str {
        "connect"
    }

    fn common(&self) -> &CommonFields {
        &self.common
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        if let Some(v) = common_field(&self.common, name) {
            return Some(v);
        }
        match name {
            "fd.num" => Some(FieldValue::Int(self.fd as i64)),
            "fd.ip" | "fd.sip" => Some(FieldValue::Str(self.ip.clone())),
            "fd.port" | "fd.sport" => Some(FieldValue::Int(self.port as i64)),
            "evt.res" => Some(FieldValue::Int(self.ret as i64)),
            _ => None,
        }
    }
}

impl EventView for AcceptEvent {
    fn event_type(&self) -> &'static str {
        "accept"
    }

    fn common(&self) -> &CommonFields {
        &self.common
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        if let Some(v) = common_field(&self.common, name) {
            return Some(v);
        }
        match name {
            "fd.num" => Some(FieldValue::Int(self.ret as i64)),
            "evt.res" => Some(FieldValue::Int(self.ret as i64)),
            "fd.ip" | "fd.rip" => Some(FieldValue::Str(self.ip.clone())),
            "fd.port" | "fd.rport" => Some(FieldValue::Int(self.port as i64)),
            _ => None,
        }
    }
}

impl EventView for PtraceEvent {
    fn event_type(&self) -> &'static str {
        "ptrace"
    }

    fn common(&self) -> &CommonFields {
        &self.common
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        if let Some(v) = common_field(&self.common, name) {
            return Some(v);
        }
        match name {
            "evt.arg.request" => Some(FieldValue::Str(
                ptrace_mnemonic(self.request)
                    .map(str::to_string)
                    .unwrap_or_else(|| self.request.to_string()),
            )),
            "proc.target_pid" => Some(FieldValue::Int(self.target_pid as i64)),
            "evt.arg.addr" => Some(FieldValue::Str(format!("0x{:x}", self.addr))),
            "evt.res" => Some(FieldValue::Int(self.ret as i64)),
            _ => None,
        }
    }
}

impl EventView for MemfdCreateEvent {
    fn event_type(&self) -> &'static str {
        "memfd_create"
    }

    fn common(&self) -> &CommonFields {
        &self.common
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        if let Some(v) = common_field(&self.common, name) {
            return Some(v);
        }
        match name {
            "evt.arg.name" => Some(FieldValue::Str(self.name.clone())),
            "evt.arg.flags" => Some(FieldValue::Int(self.flags as i64)),
            "evt.res" => Some(FieldValue::Int(self.ret as i64)),
            "fd.num" => Some(FieldValue::Int(self.ret as i64)),
            _ => None,
        }
    }
}

impl EventView for ChmodEvent {
    fn event_type(&self) -> &'static str {
        "chmod"
    }

    fn common(&self) -> &CommonFields {
        &self.common
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        if let Some(v) = common_field(&self.common, name) {
            return Some(v);
        }
        match name {
            "fd.name" => Some(FieldValue::Str(self.filename.clone())),
            "evt.arg.filename" => Some(FieldValue::Str(self.filename.clone())),
            "evt.arg.mode" => Some(FieldValue::Str(format!("0{:o}", self.mode))),
            "evt.res" => Some(FieldValue::Int(self.ret as i64)),
            _ => None,
        }
    }
}

impl EventView for Event {
    fn event_type(&self) -> &'static str {
        match self {
            Event::Openat(e) => e.event_type(),
            Event::Execve(e) => e.event_type(),
            Event::Connect(e) => e.event_type(),
            Event::Accept(e) => e.event_type(),
            Event::Ptrace(e) => e.event_type(),
            Event::MemfdCreate(e) => e.event_type(),
            Event::Chmod(e) => e.event_type(),
        }
    }

    fn common(&self) -> &CommonFields {
        match self {
            Event::Openat(e) => e.common(),
            Event::Execve(e) => e.common(),
            Event::Connect(e) => e.common(),
            Event::Accept(e) => e.common(),
            Event::Ptrace(e) => e.common(),
            Event::MemfdCreate(e) => e.common(),
            Event::Chmod(e) => e.common(),
        }
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        match self {
            Event::Openat(e) => e.field(name),
            Event::Execve(e) => e.field(name),
            Event::Connect(e) => e.field(name),
            Event::Accept(e) => e.field(name),
            Event::Ptrace(e) => e.field(name),
            Event::MemfdCreate(e) => e.field(name),
            Event::Chmod(e) => e.field(name),
        }
    }
}
