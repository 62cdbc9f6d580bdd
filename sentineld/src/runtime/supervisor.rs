//! The pipeline supervisor (C7): owns the transport, wires every channel's
//! poller to the rule engine, and coordinates shutdown across all of them.
//! Grounded on the teacher's signal-handling and task-spawning sequence in
//! `main.rs`, narrowed to the `Init -> Running -> Draining -> Stopped`
//! state machine this pipeline needs.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::watch;
use tokio::time::{Duration, interval};

use sentineld_wire::Channel;

use crate::alert::AlertSink;
use crate::codec::{
    decode_accept, decode_chmod, decode_connect, decode_execve, decode_memfd_create,
    decode_openat, decode_ptrace,
};
use crate::enrich::{self, EnrichedEvent};
use crate::event::{Event, EventView};
use crate::metrics::Metrics;
use crate::rules::RuleEngine;
use crate::runtime::poller::{self, Decoder};
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Init,
    Running,
    Draining,
    Stopped,
}

pub struct Supervisor {
    state: State,
    metrics: Arc<Metrics>,
}

/// Channels whose path-bearing field benefits from `/proc` resolution, per
/// the path enricher's scope (C3).
fn enrichable_filename_and_fd(event: &Event) -> Option<(String, i32)> {
    match event {
        Event::Openat(e) => Some((e.filename.clone(), e.ret)),
        Event::Execve(e) => Some((e.filename.clone(), -1)),
        Event::Chmod(e) => Some((e.filename.clone(), -1)),
        _ => None,
    }
}

fn decoder_for(channel: Channel) -> Decoder {
    match channel {
        Channel::Openat => decode_openat,
        Channel::Execve => decode_execve,
        Channel::Connect => decode_connect,
        Channel::Accept => decode_accept,
        Channel::Ptrace => decode_ptrace,
        Channel::MemfdCreate => decode_memfd_create,
        Channel::Chmod => decode_chmod,
    }
}

async fn dispatch(
    event: Event,
    pid: u32,
    engine: &RuleEngine,
    sink: &AlertSink,
    metrics: &Metrics,
) {
    let common = event.common().clone();
    let alerts = if let Some((filename, fd)) = enrichable_filename_and_fd(&event) {
        let resolved = enrich::resolve(pid, fd, &filename);
        if resolved.starts_with("UNKNOWN/") {
            metrics.inc_enrich_fallback();
        }
        let enriched = EnrichedEvent::new(&event, resolved);
        engine.evaluate(&enriched)
    } else {
        engine.evaluate(&event)
    };
    for alert in &alerts {
        sink.emit(alert, &common).await;
        metrics.inc_alerts_emitted();
    }
}

impl Supervisor {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            state: State::Init,
            metrics,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Run the full pipeline: load rules, spawn one poller per channel,
    /// block until a termination signal, then tear everything down in
    /// reverse order. Returns once the supervisor has reached `Stopped`.
    pub async fn run(
        &mut self,
        mut transport: Transport,
        rules_path: &Path,
        rate_cap: u64,
        alerts_file: &str,
    ) -> anyhow::Result<()> {
        let rule_set = crate::rules::RuleSet::load(rules_path)
            .with_context(|| format!("loading rule file {}", rules_path.display()))?;
        let engine = Arc::new(RuleEngine::new(rule_set));
        self.metrics.set_active_rules(engine.rule_count());

        let sink = Arc::new(
            AlertSink::open(alerts_file)
                .await
                .with_context(|| format!("opening alert sink {alerts_file}"))?,
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let readers = transport.take_readers();

        let mut joins = Vec::with_capacity(readers.len());
        let rt_handle = tokio::runtime::Handle::current();
        for (channel, ring_buf) in readers {
            let engine = Arc::clone(&engine);
            let sink = Arc::clone(&sink);
            let metrics_for_dispatch = Arc::clone(&self.metrics);
            let rt_handle = rt_handle.clone();
            let (_handle, join) = poller::spawn_poller(
                channel,
                ring_buf,
                decoder_for(channel),
                Arc::clone(&self.metrics),
                rate_cap,
                shutdown_rx.clone(),
                move |event| {
                    let engine = Arc::clone(&engine);
                    let sink = Arc::clone(&sink);
                    let metrics = Arc::clone(&metrics_for_dispatch);
                    let pid = event.common().pid;
                    rt_handle.spawn(async move {
                        dispatch(event, pid, &engine, &sink, &metrics).await;
                    });
                },
            );
            joins.push(join);
        }

        self.state = State::Running;
        log::info!("sentineld running: {} channels active", joins.len());

        let metrics_rollup = Arc::clone(&self.metrics);
        let rollup_task = tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(1));
            loop {
                ticker.tick().await;
                metrics_rollup.rollup();
            }
        });

        wait_for_termination().await;

        self.state = State::Draining;
        log::info!("sentineld draining: closing pollers");
        let _ = shutdown_tx.send(true);
        for join in joins {
            let _ = join.await;
        }
        rollup_task.abort();

        // `transport` drops here, closing the producer only after every
        // reader's poller task has observed shutdown and returned.
        drop(transport);

        self.state = State::Stopped;
        log::info!("sentineld stopped");
        Ok(())
    }
}

/// Block until either SIGTERM or the host's interrupt signal arrives,
/// matching the teacher's dual signal handling.
async fn wait_for_termination() {
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(err) => {
            log::warn!("failed to install SIGTERM handler: {err}");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = sigterm.recv() => {
            log::info!("received SIGTERM");
        }
        _ = tokio::signal::ctrl_c() => {
            log::info!("received interrupt");
        }
    }
}
