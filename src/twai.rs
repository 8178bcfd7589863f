//! TWAI (CAN) controller backend for the ESP32.
//!
//! Drives the peripheral through the raw `twai_*` API from
//! [`esp_idf_svc::sys`]: the safe HAL wrapper does not expose the alert
//! word, and alert readout is how bus-off and queue-overrun conditions
//! reach the receiver task.

use core::time::Duration;

use embedded_can::{ExtendedId, Id, StandardId};
use esp_idf_hal::delay::TickType;
use esp_idf_svc::sys::{self, esp, EspError};

use crate::bus::{AlertMask, BitRate, BusConfig, BusDriver, RxEvent};
use crate::frame::CanFrame;

/// The installed TWAI controller.
///
/// Single-shot lifecycle: [`TwaiBus::install`] claims the pins and hardware
/// queues, [`BusDriver::start`] puts the controller on the bus, and dropping
/// the value stops and uninstalls the driver again.
pub struct TwaiBus {
    started: bool,
}

impl TwaiBus {
    /// Install the TWAI driver for the attachment described by `config`.
    ///
    /// Listen-only mode with an accept-all filter; the transmit queue length
    /// is zero because nothing is ever sent. Must not be called again before
    /// the previous instance is dropped.
    pub fn install(config: &BusConfig) -> Result<Self, EspError> {
        let general = sys::twai_general_config_t {
            mode: sys::twai_mode_t_TWAI_MODE_LISTEN_ONLY,
            tx_io: config.tx_pin,
            rx_io: config.rx_pin,
            clkout_io: sys::gpio_num_t_GPIO_NUM_NC,
            bus_off_io: sys::gpio_num_t_GPIO_NUM_NC,
            // Listen-only: nothing is ever queued for transmit.
            tx_queue_len: 0,
            rx_queue_len: config.rx_queue_len,
            alerts_enabled: config.alerts.bits(),
            clkout_divider: 0,
            ..Default::default()
        };
        let timing = timing_config(config.bit_rate);
        let filter = sys::twai_filter_config_t {
            acceptance_code: 0,
            acceptance_mask: u32::MAX,
            single_filter: true,
        };

        esp!(unsafe { sys::twai_driver_install(&general, &timing, &filter) })?;
        Ok(Self { started: false })
    }
}

impl BusDriver for TwaiBus {
    type Error = EspError;

    fn start(&mut self) -> Result<(), EspError> {
        esp!(unsafe { sys::twai_start() })?;
        self.started = true;
        Ok(())
    }

    fn receive(&mut self, wait: Duration) -> Result<RxEvent, EspError> {
        // Drain pending alerts first so a full receive queue cannot defer
        // the report of its own overrun.
        let mut alerts: u32 = 0;
        match esp!(unsafe { sys::twai_read_alerts(&mut alerts, 0) }) {
            Ok(()) if alerts != 0 => return Ok(RxEvent::Anomaly(AlertMask::from_bits(alerts))),
            Ok(()) => {}
            Err(e) if e.code() == sys::ESP_ERR_TIMEOUT as i32 => {}
            Err(e) => return Err(e),
        }

        let ticks: sys::TickType_t = TickType::new_millis(wait.as_millis() as u32).into();
        let mut message = sys::twai_message_t::default();
        match esp!(unsafe { sys::twai_receive(&mut message, ticks) }) {
            Ok(()) => Ok(RxEvent::Frame(convert(&message))),
            Err(e) if e.code() == sys::ESP_ERR_TIMEOUT as i32 => Ok(RxEvent::Idle),
            Err(e) => Err(e),
        }
    }
}

impl Drop for TwaiBus {
    fn drop(&mut self) {
        if self.started {
            let _ = esp!(unsafe { sys::twai_stop() });
        }
        let _ = esp!(unsafe { sys::twai_driver_uninstall() });
    }
}

/// Map a received controller message into the frame model.
///
/// Identifier and length are masked to their valid ranges; the controller
/// should never exceed them, but a stray bit must not poison the log.
fn convert(message: &sys::twai_message_t) -> CanFrame {
    // The flags word shares storage with the per-bit flag fields.
    let flags = unsafe { message.__bindgen_anon_1.flags };
    let extended = flags & sys::TWAI_MSG_FLAG_EXTD != 0;
    let remote = flags & sys::TWAI_MSG_FLAG_RTR != 0;

    let id = if extended {
        let raw = message.identifier & ExtendedId::MAX.as_raw();
        Id::Extended(ExtendedId::new(raw).unwrap_or(ExtendedId::ZERO))
    } else {
        let raw = message.identifier as u16 & StandardId::MAX.as_raw();
        Id::Standard(StandardId::new(raw).unwrap_or(StandardId::ZERO))
    };
    let dlc = message.data_length_code.min(8);

    CanFrame::from_parts(id, remote, dlc, message.data)
}

/// Bit timing presets for the 80 MHz APB clock, as published by the IDF's
/// `TWAI_TIMING_CONFIG_*` table.
fn timing_config(bit_rate: BitRate) -> sys::twai_timing_config_t {
    let (brp, tseg_1, tseg_2, sjw) = match bit_rate {
        BitRate::B25K => (128, 16, 8, 3),
        BitRate::B50K => (80, 15, 4, 3),
        BitRate::B100K => (40, 15, 4, 3),
        BitRate::B125K => (32, 15, 4, 3),
        BitRate::B250K => (16, 15, 4, 3),
        BitRate::B500K => (8, 15, 4, 3),
        BitRate::B800K => (4, 16, 8, 3),
        BitRate::B1M => (4, 15, 4, 3),
    };
    sys::twai_timing_config_t {
        brp,
        tseg_1,
        tseg_2,
        sjw,
        triple_sampling: false,
        ..Default::default()
    }
}
