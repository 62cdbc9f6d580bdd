//! Path enrichment (C3): best-effort resolution of a raw filename to an
//! absolute path via the `/proc/<pid>/{fd,cwd}` collaborator, plus the
//! wrapper that lets enriched events satisfy [`crate::event::EventView`].

use procfs::process::{FDTarget, Process};

use crate::event::{CommonFields, EventView, FieldValue};

/// Resolve `(pid, fd, filename)` to an absolute path. Never fails: a
/// missing `/proc` entry is a normal outcome, not an error, and the worst
/// case is an `"UNKNOWN/<name>"` placeholder.
///
/// Order: an open descriptor's own symlink target is authoritative; a
/// filename that is already absolute needs no resolution; otherwise fall
/// back to the process's working directory; otherwise give up gracefully.
pub fn resolve(pid: u32, fd: i32, filename: &str) -> String {
    if fd >= 0 {
        if let Some(target) = read_fd_target(pid, fd) {
            return target;
        }
    }
    if filename.starts_with('/') {
        return filename.to_string();
    }
    if let Some(cwd) = read_cwd(pid) {
        return join_path(&cwd, filename);
    }
    format!("UNKNOWN/{filename}")
}

fn read_fd_target(pid: u32, fd: i32) -> Option<String> {
    let proc = Process::new(pid as i32).ok()?;
    let info = proc.fd_from_fd(fd).ok()?;
    match info.target {
        FDTarget::Path(path) => Some(path.to_string_lossy().into_owned()),
        _ => None,
    }
}

fn read_cwd(pid: u32) -> Option<String> {
    let proc = Process::new(pid as i32).ok()?;
    let cwd = proc.cwd().ok()?;
    Some(cwd.to_string_lossy().into_owned())
}

fn join_path(cwd: &str, filename: &str) -> String {
    if cwd.ends_with('/') {
        format!("{cwd}{filename}")
    } else {
        format!("{cwd}/{filename}")
    }
}

/// Wraps an [`EventView`] and overrides the path-related field lookups
/// with the resolved path, delegating everything else. Produced for
/// `openat`, `execve` and `chmod` -- the three variants whose rule-visible
/// path field benefits from `/proc` resolution.
pub struct EnrichedEvent<'a> {
    inner: &'a dyn EventView,
    resolved_path: String,
}

impl<'a> EnrichedEvent<'a> {
    pub fn new(inner: &'a dyn EventView, resolved_path: String) -> Self {
        Self {
            inner,
            resolved_path,
        }
    }

    pub fn resolved_path(&self) -> &str {
        &self.resolved_path
    }
}

const PATH_FIELDS: &[&str] = &["fd.name", "evt.arg.filename", "proc.exepath"];

impl EventView for EnrichedEvent<'_> {
    fn event_type(&self) -> &'static str {
        self.inner.event_type()
    }

    fn common(&self) -> &CommonFields {
        self.inner.common()
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        if PATH_FIELDS.contains(&name) {
            return Some(FieldValue::Str(self.resolved_path.clone()));
        }
        self.inner.field(name)
    }
}
