//! The rule model, loader (C4) and evaluation engine (C5).
//!
//! Rules are plain data loaded once at start-up from a YAML document and
//! never mutated afterwards, so the engine can be shared across pollers
//! without a lock.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::event::EventView;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Critical => "CRITICAL",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Condition {
    pub field: String,
    pub operator: String,
    pub value: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Rule {
    pub name: String,
    pub severity: Severity,
    pub message: String,
    pub event_types: Vec<String>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RuleSet {
    #[serde(default)]
    pub rules: Vec<Rule>,
}

#[derive(Debug, Error)]
pub enum RuleLoadError {
    #[error("failed to read rule file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse rule file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

impl RuleSet {
    /// Load and parse the YAML rule file at `path`. Failure here is
    /// start-up-fatal: callers should propagate it and exit non-zero,
    /// unlike [`crate::config::Config::load`] which degrades gracefully.
    pub fn load(path: &Path) -> Result<Self, RuleLoadError> {
        let contents = fs::read_to_string(path).map_err(|source| RuleLoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_yaml::from_str(&contents).map_err(|source| RuleLoadError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub rule_name: String,
    pub severity: Severity,
    pub message: String,
    pub derived_target: String,
}

/// Stringified comparison per §4.5: both sides are compared as strings for
/// `=`/`!=`/`startswith`/`contains`/`in`/`not in`; `lt`/`mt` additionally
/// parse both sides as integers, treating a failed parse as zero.
fn compare(operator: &str, actual: &str, expected: &str) -> bool {
    match operator {
        "=" => actual == expected,
        "!=" => actual != expected,
        "lt" => parse_int(actual) < parse_int(expected),
        "mt" => parse_int(actual) > parse_int(expected),
        "startswith" => actual.starts_with(expected),
        "contains" => actual.contains(expected),
        "in" => expected.split(',').any(|token| token.trim() == actual),
        "not in" => !expected.split(',').any(|token| token.trim() == actual),
        _ => false,
    }
}

fn parse_int(s: &str) -> i64 {
    s.trim().parse().unwrap_or(0)
}

/// `derived_target` per event type, to aid triage in the alert line.
fn derived_target(event: &dyn EventView) -> String {
    match event.event_type() {
        "openat" | "chmod" => event
            .field("fd.name")
            .or_else(|| event.field("evt.arg.filename"))
            .map(|v| format!("File: {v}"))
            .unwrap_or_default(),
        "execve" => {
            let cmdline = event
                .field("proc.cmdline")
                .map(|v| v.to_string())
                .unwrap_or_default();
            let truncated: String = cmdline.chars().take(50).collect();
            format!("Cmd: {truncated}")
        }
        "connect" => format!(
            "Net: {}:{}",
            event.field("fd.ip").map(|v| v.to_string()).unwrap_or_default(),
            event.field("fd.port").map(|v| v.to_string()).unwrap_or_default()
        ),
        "accept" => format!(
            "Net: {}:{}",
            event.field("fd.ip").map(|v| v.to_string()).unwrap_or_default(),
            event.field("fd.port").map(|v| v.to_string()).unwrap_or_default()
        ),
        "ptrace" => format!(
            "Req: {} -> TargetPid: {}",
            event
                .field("evt.arg.request")
                .map(|v| v.to_string())
                .unwrap_or_default(),
            event
                .field("proc.target_pid")
                .map(|v| v.to_string())
                .unwrap_or_default()
        ),
        "memfd_create" => event
            .field("evt.arg.name")
            .map(|v| format!("Memfd: {v}"))
            .unwrap_or_default(),
        _ => String::new(),
    }
}

pub struct RuleEngine {
    rule_set: RuleSet,
}

impl RuleEngine {
    pub fn new(rule_set: RuleSet) -> Self {
        Self { rule_set }
    }

    pub fn rule_count(&self) -> usize {
        self.rule_set.rules.len()
    }

    /// Evaluate every rule against `event`, returning every rule that
    /// matches. One rule failing to match never short-circuits evaluation
    /// of the rest.
    pub fn evaluate(&self, event: &dyn EventView) -> Vec<Alert> {
        self.rule_set
            .rules
            .iter()
            .filter(|rule| self.rule_matches(rule, event))
            .map(|rule| Alert {
                rule_name: rule.name.clone(),
                severity: rule.severity,
                message: rule.message.clone(),
                derived_target: derived_target(event),
            })
            .collect()
    }

    fn rule_matches(&self, rule: &Rule, event: &dyn EventView) -> bool {
        if !rule
            .event_types
            .iter()
            .any(|t| t == event.event_type())
        {
            return false;
        }
        rule.conditions.iter().all(|condition| {
            match event.field(&condition.field) {
                Some(value) => compare(&condition.operator, &value.to_string(), &condition.value),
                None => false,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{CommonFields, Event, ExecveEvent, OpenatEvent, PtraceEvent};

    fn common() -> CommonFields {
        CommonFields {
            cgroup_id: 1,
            pid: 42,
            ppid: 1,
            uid: 0,
            gid: 0,
            comm: "cat".to_string(),
            pcomm: "bash".to_string(),
        }
    }

    #[test]
    fn parses_minimal_rule_document() {
        let yaml = r#"
rules:
  - name: shadow-read
    severity: CRITICAL
    event_types: [openat]
    conditions:
      - { field: fd.name, operator: "=", value: /etc/shadow }
    message: sensitive file read
"#;
        let rule_set: RuleSet = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(rule_set.rules.len(), 1);
        assert_eq!(rule_set.rules[0].severity, Severity::Critical);
    }

    #[test]
    fn scenario_openat_shadow_read_matches() {
        let rule_set = RuleSet {
            rules: vec![Rule {
                name: "shadow-read".to_string(),
                severity: Severity::Critical,
                message: "sensitive file read".to_string(),
                event_types: vec!["openat".to_string()],
                conditions: vec![Condition {
                    field: "fd.name".to_string(),
                    operator: "=".to_string(),
                    value: "/etc/shadow".to_string(),
                }],
            }],
        };
        let engine = RuleEngine::new(rule_set);
        let event = Event::Openat(OpenatEvent {
            common: common(),
            flags: 0,
            dfd: -100,
            ret: 3,
            filename: "/etc/shadow".to_string(),
        });
        let alerts = engine.evaluate(&event);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].derived_target, "File: /etc/shadow");
    }

    #[test]
    fn scenario_execve_curl_matches_and_truncates_cmdline() {
        let rule_set = RuleSet {
            rules: vec![Rule {
                name: "curl-exec".to_string(),
                severity: Severity::Info,
                message: "curl executed".to_string(),
                event_types: vec!["execve".to_string()],
                conditions: vec![Condition {
                    field: "proc.name".to_string(),
                    operator: "=".to_string(),
                    value: "curl".to_string(),
                }],
            }],
        };
        let engine = RuleEngine::new(rule_set);
        let mut common_fields = common();
        common_fields.comm = "curl".to_string();
        let event = Event::Execve(ExecveEvent {
            common: common_fields,
            ret: 0,
            filename: "/usr/bin/curl".to_string(),
            argv: vec!["curl".to_string(), "http://x".to_string()],
            envp: vec![],
        });
        let alerts = engine.evaluate(&event);
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].derived_target.starts_with("Cmd: curl http://x"));
    }

    #[test]
    fn scenario_multi_condition_and_requires_all() {
        let rule_set = RuleSet {
            rules: vec![Rule {
                name: "ls-long".to_string(),
                severity: Severity::Info,
                message: "ls -l".to_string(),
                event_types: vec!["execve".to_string()],
                conditions: vec![
                    Condition {
                        field: "proc.name".to_string(),
                        operator: "=".to_string(),
                        value: "ls".to_string(),
                    },
                    Condition {
                        field: "proc.cmdline".to_string(),
                        operator: "contains".to_string(),
                        value: "-l".to_string(),
                    },
                ],
            }],
        };
        let engine = RuleEngine::new(rule_set);
        let mut common_fields = common();
        common_fields.comm = "ls".to_string();

        let matching = Event::Execve(ExecveEvent {
            common: common_fields.clone(),
            ret: 0,
            filename: "/bin/ls".to_string(),
            argv: vec!["ls".to_string(), "-l".to_string(), "/tmp".to_string()],
            envp: vec![],
        });
        assert_eq!(engine.evaluate(&matching).len(), 1);

        let non_matching = Event::Execve(ExecveEvent {
            common: common_fields,
            ret: 0,
            filename: "/bin/ls".to_string(),
            argv: vec!["ls".to_string(), "/tmp".to_string()],
            envp: vec![],
        });
        assert_eq!(engine.evaluate(&non_matching).len(), 0);
    }

    #[test]
    fn scenario_ptrace_attach_mnemonic_matches() {
        let rule_set = RuleSet {
            rules: vec![Rule {
                name: "ptrace-attach".to_string(),
                severity: Severity::Warning,
                message: "process attached via ptrace".to_string(),
                event_types: vec!["ptrace".to_string()],
                conditions: vec![Condition {
                    field: "evt.arg.request".to_string(),
                    operator: "=".to_string(),
                    value: "PTRACE_ATTACH".to_string(),
                }],
            }],
        };
        let engine = RuleEngine::new(rule_set);
        let event = Event::Ptrace(PtraceEvent {
            common: common(),
            ret: 0,
            request: 16,
            target_pid: 1234,
            addr: 0,
        });
        let alerts = engine.evaluate(&event);
        assert_eq!(alerts.len(), 1);
        assert_eq!(
            alerts[0].derived_target,
            "Req: PTRACE_ATTACH -> TargetPid: 1234"
        );
    }

    #[test]
    fn unknown_operator_never_matches() {
        assert!(!compare("regex", "abc", "a.*"));
    }

    #[test]
    fn in_and_not_in_are_complements() {
        assert!(compare("in", "b", "a, b, c"));
        assert!(!compare("not in", "b", "a, b, c"));
        assert!(!compare("in", "z", "a, b, c"));
        assert!(compare("not in", "z", "a, b, c"));
    }

    #[test]
    fn startswith_empty_prefix_always_matches() {
        assert!(compare("startswith", "anything", ""));
    }

    #[test]
    fn contains_empty_needle_always_matches() {
        assert!(compare("contains", "anything", ""));
    }

    #[test]
    fn adding_a_condition_never_increases_the_match_set() {
        let loose = Rule {
            name: "loose".to_string(),
            severity: Severity::Info,
            message: String::new(),
            event_types: vec!["openat".to_string()],
            conditions: vec![],
        };
        let mut strict = loose.clone();
        strict.conditions.push(Condition {
            field: "fd.name".to_string(),
            operator: "=".to_string(),
            value: "/etc/shadow".to_string(),
        });
        let engine_loose = RuleEngine::new(RuleSet {
            rules: vec![loose],
        });
        let engine_strict = RuleEngine::new(RuleSet {
            rules: vec![strict],
        });
        let event = Event::Openat(OpenatEvent {
            common: common(),
            flags: 0,
            dfd: -100,
            ret: 3,
            filename: "/tmp/not-shadow".to_string(),
        });
        assert!(engine_loose.evaluate(&event).len() >= engine_strict.evaluate(&event).len());
    }
}
