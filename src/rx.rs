//! The dedicated receive task: park, drain, format, log.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::bus::{AlertMask, BusDriver, RxEvent};
use crate::render::FrameRenderer;
use crate::sync::{ShutdownToken, StartupGate};

/// Upper bound on one receive wait; the shutdown token is re-checked after
/// each interval, so this also bounds stop latency.
pub(crate) const RECEIVE_WAIT: Duration = Duration::from_millis(100);

/// Where the monitor sends its text output.
///
/// The handle is injected at construction instead of talking to a process
/// global, so tests can capture the stream and embedders can reroute it.
pub trait EventLog: Send + 'static {
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
}

/// Routes monitor output to the `log` crate under the `canbus` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct CanLog;

impl EventLog for CanLog {
    fn info(&self, message: &str) {
        log::info!(target: "canbus", "{message}");
    }

    fn warn(&self, message: &str) {
        log::warn!(target: "canbus", "{message}");
    }
}

/// Which CPU the receive task is pinned to, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Core {
    Core0,
    Core1,
}

/// Scheduling parameters for the receive task.
#[derive(Debug, Clone)]
pub struct RxTaskOptions {
    pub name: &'static str,
    pub stack_size: usize,
    /// FreeRTOS priority; above the main task so queued frames drain promptly.
    pub priority: u8,
    pub pin_to_core: Option<Core>,
}

impl Default for RxTaskOptions {
    fn default() -> Self {
        Self {
            name: "can-rx",
            stack_size: 4096,
            priority: 9,
            pin_to_core: None,
        }
    }
}

const ANOMALY_KINDS: [(AlertMask, &str); 5] = [
    (AlertMask::BUS_ERROR, "bus error"),
    (AlertMask::ERR_PASSIVE, "controller entered error-passive state"),
    (AlertMask::BUS_OFF, "controller went bus-off"),
    (AlertMask::RX_QUEUE_FULL, "receive queue full, frame lost"),
    (AlertMask::RX_FIFO_OVERRUN, "receive FIFO overrun"),
];

/// Running totals per anomaly kind, reported with each occurrence.
struct AnomalyStats {
    seen: [u32; ANOMALY_KINDS.len()],
}

impl AnomalyStats {
    fn new() -> Self {
        Self {
            seen: [0; ANOMALY_KINDS.len()],
        }
    }

    fn report<L: EventLog>(&mut self, alerts: AlertMask, log: &L) {
        for (count, (kind, what)) in self.seen.iter_mut().zip(ANOMALY_KINDS) {
            if alerts.contains(kind) {
                *count += 1;
                log.warn(&format!("{what} (seen {count})"));
            }
        }
    }
}

/// Body of the receive task.
///
/// Parks on the gate until the coordinator hands over the started driver,
/// then drains the bus until cancelled. Anomalies and receive errors are
/// logged and counted but never stop the loop.
pub(crate) fn run<D, L>(gate: &StartupGate<D>, token: &ShutdownToken, log: &L)
where
    D: BusDriver,
    L: EventLog,
{
    let Some(mut driver) = gate.wait() else {
        return;
    };
    if token.is_cancelled() {
        return;
    }

    log.info("receive task started");
    let mut renderer = FrameRenderer::new();
    let mut stats = AnomalyStats::new();

    while !token.is_cancelled() {
        match driver.receive(RECEIVE_WAIT) {
            Ok(RxEvent::Frame(frame)) => log.info(renderer.render(&frame)),
            Ok(RxEvent::Idle) => {}
            Ok(RxEvent::Anomaly(alerts)) => stats.report(alerts, log),
            Err(e) => log.warn(&format!("receive failed: {e}")),
        }
    }
}

/// Spawn the receive task, parked on `gate`.
pub(crate) fn spawn<D, L>(
    options: &RxTaskOptions,
    gate: Arc<StartupGate<D>>,
    token: ShutdownToken,
    log: L,
) -> io::Result<JoinHandle<()>>
where
    D: BusDriver,
    L: EventLog,
{
    #[cfg(target_os = "espidf")]
    apply_task_options(options)?;

    let handle = thread::Builder::new()
        .name(options.name.to_owned())
        .stack_size(options.stack_size)
        .spawn(move || run(&gate, &token, &log))?;

    #[cfg(target_os = "espidf")]
    reset_task_options()?;

    Ok(handle)
}

/// FreeRTOS scheduling attributes apply to threads spawned while the
/// configuration is set; reset afterwards so later threads are unaffected.
#[cfg(target_os = "espidf")]
fn apply_task_options(options: &RxTaskOptions) -> io::Result<()> {
    use esp_idf_hal::cpu;
    use esp_idf_hal::task::thread::ThreadSpawnConfiguration;

    ThreadSpawnConfiguration {
        stack_size: options.stack_size,
        priority: options.priority,
        pin_to_core: options.pin_to_core.map(|core| match core {
            Core::Core0 => cpu::Core::Core0,
            Core::Core1 => cpu::Core::Core1,
        }),
        ..Default::default()
    }
    .set()
    .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
}

#[cfg(target_os = "espidf")]
fn reset_task_options() -> io::Result<()> {
    use esp_idf_hal::task::thread::ThreadSpawnConfiguration;

    ThreadSpawnConfiguration::default()
        .set()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
}
