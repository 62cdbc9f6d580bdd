use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use caps::{CapSet, Capability};
use clap::Parser;

use sentineld::config::Config;
use sentineld::metrics::Metrics;
use sentineld::runtime::Supervisor;
use sentineld::transport::Transport;

#[derive(Parser, Debug)]
#[command(name = "sentineld")]
#[command(about = "Host-based syscall security event monitor")]
struct Args {
    /// Path to the YAML rule file.
    #[arg(long, value_name = "PATH")]
    rules: Option<PathBuf>,
}

const REQUIRED_CAPABILITIES: &[Capability] = &[
    Capability::CAP_BPF,
    Capability::CAP_PERFMON,
    Capability::CAP_SYS_ADMIN,
];

fn check_capabilities() -> anyhow::Result<()> {
    for cap in REQUIRED_CAPABILITIES {
        let has_cap = caps::has_cap(None, CapSet::Effective, *cap)
            .with_context(|| format!("failed to query capability {cap:?}"))?;
        if !has_cap {
            anyhow::bail!(
                "missing {:?} capability. Grant it with `sudo setcap cap_bpf,cap_perfmon,cap_sys_admin+ep $(command -v sentineld)` and restart.",
                cap
            );
        }
    }
    Ok(())
}

fn parse_kernel_version(raw: &str) -> Option<(u32, u32)> {
    let version_part = raw.trim().split('-').next()?;
    let mut segments = version_part.split('.');
    let major = segments.next()?.parse().ok()?;
    let minor = segments.next().unwrap_or("0").parse().ok()?;
    Some((major, minor))
}

fn check_kernel_version(min_major: u32, min_minor: u32) -> anyhow::Result<()> {
    let release = fs::read_to_string("/proc/sys/kernel/osrelease")
        .context("failed to read /proc/sys/kernel/osrelease")?;
    let version =
        parse_kernel_version(&release).context("unable to parse kernel release string")?;
    if version < (min_major, min_minor) {
        anyhow::bail!(
            "kernel {}.{} lacks ring-buffer tracepoint support; require >= {min_major}.{min_minor}",
            version.0,
            version.1,
        );
    }
    Ok(())
}

fn ensure_environment() -> anyhow::Result<()> {
    check_capabilities()?;
    check_kernel_version(5, 8)
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    if let Err(err) = ensure_environment() {
        log::error!("environment check failed: {err:?}");
        return ExitCode::FAILURE;
    }

    let config = Config::load();
    let rules_path = args.rules.unwrap_or_else(|| PathBuf::from(&config.rules.path));

    let transport = match Transport::setup() {
        Ok(t) => t,
        Err(err) => {
            log::error!("transport setup failed: {err:?}");
            return ExitCode::FAILURE;
        }
    };

    let metrics = Arc::new(Metrics::new());
    let mut supervisor = Supervisor::new(Arc::clone(&metrics));

    log::info!("sentineld starting, rules={}", rules_path.display());
    let result = supervisor
        .run(
            transport,
            &rules_path,
            config.runtime.events_rate_cap,
            &config.logging.alerts_file,
        )
        .await;

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("sentineld exited with error: {err:?}");
            ExitCode::FAILURE
        }
    }
}
