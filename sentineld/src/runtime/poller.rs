//! The channel poller (C6): one long-lived task per ring buffer, reading
//! one record at a time, decoding it with the codec for that channel, and
//! dispatching the result to a handler. Grounded on the teacher's
//! `start_listener` (the `RingBuf`-per-reader path) and the Go original's
//! generic `poller.Start[T]`.

use std::sync::Arc;
use std::time::Duration;

use aya::maps::MapData;
use aya::maps::ring_buf::RingBuf;
use tokio::sync::watch;
use tokio::task::spawn_blocking;

use sentineld_wire::Channel;

use crate::codec::DecodeError;
use crate::event::Event;
use crate::metrics::Metrics;

const EMPTY_POLL_BACKOFF: Duration = Duration::from_millis(1);

/// Decoder entry point for one channel, one per syscall variant. Matches
/// `codec::decode_<variant>`'s signature so the poller can stay generic
/// over which variant it drains.
pub type Decoder = fn(&[u8]) -> Result<Event, DecodeError>;

pub struct PollerHandle {
    pub channel: Channel,
}

/// Spawn a task that repeatedly reads one record from `ring_buf`, decodes
/// it with `decode`, and passes the typed [`Event`] to `on_event`.
///
/// `shutdown` is the poller's sole cancellation signal (the supervisor's
/// `Draining` transition): `RingBuf::next()` itself is non-blocking (it
/// returns `None` whenever the buffer is merely empty), so closing is
/// modeled as the supervisor flipping this watch channel and then, once
/// every poller has observed it and returned, dropping the reader. The
/// read loop still runs on a blocking-pool thread rather than an async
/// worker thread, mirroring the teacher's `spawn_blocking` wrapping of the
/// same `RingBuf::next()` call.
pub fn spawn_poller<F>(
    channel: Channel,
    mut ring_buf: RingBuf<MapData>,
    decode: Decoder,
    metrics: Arc<Metrics>,
    rate_cap: u64,
    mut shutdown: watch::Receiver<bool>,
    on_event: F,
) -> (PollerHandle, tokio::task::JoinHandle<()>)
where
    F: Fn(Event) + Send + Sync + 'static,
{
    let handle = PollerHandle { channel };
    let join = spawn_blocking(move || {
        loop {
            if *shutdown.borrow() {
                log::info!("{} poller draining", channel.as_str());
                return;
            }

            let Some(item) = ring_buf.next() else {
                std::thread::sleep(EMPTY_POLL_BACKOFF);
                continue;
            };

            if !metrics.record_event(channel, rate_cap) {
                continue;
            }

            match decode(item.as_ref()) {
                Ok(event) => on_event(event),
                Err(err) => {
                    metrics.record_decode_error();
                    log::warn!("{} decode error: {err}", channel.as_str());
                }
            }
        }
    });
    (handle, join)
}
