//! Startup coordination for the bus monitor.

use std::sync::Arc;
use std::thread::JoinHandle;

use crate::bus::{BusConfig, BusDriver, StartError};
use crate::rx::{self, EventLog, RxTaskOptions};
use crate::sync::{ShutdownToken, StartupGate};

/// A running bus monitor: the receive task plus its shutdown token.
#[derive(Debug)]
pub struct CanBus {
    task: JoinHandle<()>,
    token: ShutdownToken,
}

impl CanBus {
    /// Bring the monitor up.
    ///
    /// The order is load-bearing: the receive task is created first and parks
    /// on the gate, so once the driver goes on-bus there is already a drain
    /// for the receive queue and the earliest frames cannot be dropped before
    /// anyone reads them. Only after `start` returns is the gate released.
    ///
    /// `install` claims the peripheral described by `config`; any install or
    /// start failure aborts startup with the failed stage in the error, the
    /// gate is abandoned and the parked task is joined. No retry: errors at
    /// this stage are configuration or hardware faults, not transient ones.
    pub fn start<D, I, L>(
        config: BusConfig,
        options: RxTaskOptions,
        install: I,
        log: L,
    ) -> Result<Self, StartError<D::Error>>
    where
        D: BusDriver,
        I: FnOnce(&BusConfig) -> Result<D, D::Error>,
        L: EventLog + Clone,
    {
        let gate = Arc::new(StartupGate::new());
        let token = ShutdownToken::new();

        let task = rx::spawn(&options, Arc::clone(&gate), token.clone(), log.clone())
            .map_err(StartError::Spawn)?;

        let mut driver = match install(&config) {
            Ok(driver) => driver,
            Err(e) => {
                Self::unwind(&gate, task);
                return Err(StartError::Install(e));
            }
        };
        log.info("CAN driver installed");

        if let Err(e) = driver.start() {
            Self::unwind(&gate, task);
            return Err(StartError::Start(e));
        }
        log.info("CAN driver started");

        gate.release(driver);
        Ok(Self { task, token })
    }

    /// Cancel the receive task and wait for it to exit.
    ///
    /// Takes effect within one bounded receive wait.
    pub fn stop(self) {
        self.token.cancel();
        let _ = self.task.join();
    }

    fn unwind<D: BusDriver>(gate: &StartupGate<D>, task: JoinHandle<()>) {
        gate.abandon();
        let _ = task.join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::fixtures::standard;
    use crate::rx::testing::{FakeBusError, RecordingLog, ScriptedBus, Step};
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(2);

    #[test]
    fn frames_flow_end_to_end() {
        let log = RecordingLog::new();
        let bus = CanBus::start(
            BusConfig::default(),
            RxTaskOptions::default(),
            |_config| {
                Ok(ScriptedBus::new(vec![
                    Step::Frame(standard(0x0B1, &[0x01, 0xA0, 0xFF])),
                    Step::Frame(standard(0x0B2, &[0x01, 0x02])),
                ]))
            },
            log.clone(),
        )
        .unwrap();

        assert!(log.wait_until(WAIT, |lines| {
            lines.iter().any(|(_, m)| m.ends_with("[2] 01 02"))
        }));
        bus.stop();

        let infos = log.messages("info");
        assert!(infos.contains(&"RCV 00000000 000000B1 [3] 01 A0 FF".to_owned()));
    }

    #[test]
    fn task_parks_until_the_driver_is_started() {
        let log = RecordingLog::new();
        let bus = CanBus::start(
            BusConfig::default(),
            RxTaskOptions::default(),
            |_config| {
                let mut bus = ScriptedBus::new(vec![]);
                // Slow start: a prematurely released task would log first.
                bus.start_delay = Duration::from_millis(50);
                Ok(bus)
            },
            log.clone(),
        )
        .unwrap();

        assert!(log.wait_until(WAIT, |lines| {
            lines.iter().any(|(_, m)| m == "receive task started")
        }));
        bus.stop();

        let installed = log.position("CAN driver installed").unwrap();
        let started = log.position("CAN driver started").unwrap();
        let task_up = log.position("receive task started").unwrap();
        assert!(installed < started);
        assert!(started < task_up);
    }

    #[test]
    fn install_failure_is_fatal_and_leaves_the_task_parked() {
        let log = RecordingLog::new();
        let err = CanBus::start(
            BusConfig::default(),
            RxTaskOptions::default(),
            |_config| Err::<ScriptedBus, _>(FakeBusError("no controller")),
            log.clone(),
        )
        .unwrap_err();

        assert!(matches!(err, StartError::Install(_)));
        assert!(err.to_string().contains("installing"));
        // The task was joined without ever leaving Parked.
        assert!(log.position("receive task started").is_none());
    }

    #[test]
    fn start_failure_is_fatal_and_leaves_the_task_parked() {
        let log = RecordingLog::new();
        let err = CanBus::start(
            BusConfig::default(),
            RxTaskOptions::default(),
            |_config| {
                let mut bus = ScriptedBus::new(vec![]);
                bus.fail_start = true;
                Ok(bus)
            },
            log.clone(),
        )
        .unwrap_err();

        assert!(matches!(err, StartError::Start(_)));
        assert!(err.to_string().contains("starting"));
        assert!(log.position("CAN driver installed").is_some());
        assert!(log.position("receive task started").is_none());
    }

    #[test]
    fn stop_joins_promptly() {
        let log = RecordingLog::new();
        let bus = CanBus::start(
            BusConfig::default(),
            RxTaskOptions::default(),
            |_config| Ok(ScriptedBus::new(vec![])),
            log.clone(),
        )
        .unwrap();
        assert!(log.wait_until(WAIT, |lines| !lines.is_empty()));

        let begun = std::time::Instant::now();
        bus.stop();
        assert!(begun.elapsed() < Duration::from_secs(1));
    }
}
