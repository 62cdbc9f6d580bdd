//! The alert sink: a line-oriented append-only log stream, grounded on the
//! teacher's `handler::JsonlHandler` file-append pattern but emitting the
//! plain-text alert line from `§6` instead of JSON.

use std::sync::Arc;

use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::event::CommonFields;
use crate::rules::Alert;

/// Format one alert line:
/// `[ALERT] <rule-name> [<severity>] | Msg: <message> | Proc: <comm>(<pid>) | <derived_target>`
pub fn format_line(alert: &Alert, common: &CommonFields) -> String {
    format!(
        "[ALERT] {} [{}] | Msg: {} | Proc: {}({}) | {}",
        alert.rule_name, alert.severity, alert.message, common.comm, common.pid, alert.derived_target
    )
}

pub struct AlertSink {
    file: Arc<Mutex<tokio::fs::File>>,
}

impl AlertSink {
    pub async fn open(path: &str) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        Ok(Self {
            file: Arc::new(Mutex::new(file)),
        })
    }

    /// Emit one alert. A write failure is logged once and never stops
    /// evaluation of later alerts.
    pub async fn emit(&self, alert: &Alert, common: &CommonFields) {
        let line = format_line(alert, common);
        let mut f = self.file.lock().await;
        if let Err(err) = f.write_all(line.as_bytes()).await {
            log::error!("failed to write alert line: {err}");
            return;
        }
        let _ = f.write_all(b"\n").await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::Severity;

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
    fn formats_exact_alert_line() {
        let alert = Alert {
            rule_name: "shadow-read".to_string(),
            severity: Severity::Critical,
            message: "sensitive file read".to_string(),
            derived_target: "File: /etc/shadow".to_string(),
        };
        let line = format_line(&alert, &common());
        assert_eq!(
            line,
            "[ALERT] shadow-read [CRITICAL] | Msg: sensitive file read | Proc: cat(42) | File: /etc/shadow"
        );
    }

    #[tokio::test]
    async fn emit_appends_a_line_per_alert() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let sink = AlertSink::open(file.path().to_str().unwrap()).await.unwrap();
        let alert = Alert {
            rule_name: "r".to_string(),
            severity: Severity::Info,
            message: "m".to_string(),
            derived_target: "t".to_string(),
        };
        sink.emit(&alert, &common()).await;
        sink.emit(&alert, &common()).await;
        let contents = tokio::fs::read_to_string(file.path()).await.unwrap();
        assert_eq!(contents.lines().count(), 2);
    }
}
