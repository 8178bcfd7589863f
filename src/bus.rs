//! Bus configuration and the seam to the platform CAN driver.

use core::fmt;
use core::ops::{BitOr, BitOrAssign};
use core::time::Duration;

use crate::frame::CanFrame;

/// Supported bit-rate presets of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitRate {
    B25K,
    B50K,
    B100K,
    B125K,
    B250K,
    B500K,
    B800K,
    B1M,
}

/// Mask over the controller's alert word.
///
/// Bit positions match the TWAI alert register, so the mask passes through
/// to the driver unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AlertMask(u32);

impl AlertMask {
    pub const NONE: Self = Self(0);
    pub const BUS_ERROR: Self = Self(1 << 9);
    pub const RX_QUEUE_FULL: Self = Self(1 << 11);
    pub const ERR_PASSIVE: Self = Self(1 << 12);
    pub const BUS_OFF: Self = Self(1 << 13);
    pub const RX_FIFO_OVERRUN: Self = Self(1 << 14);

    /// Every condition the receiver task reports as an anomaly.
    pub const ANOMALIES: Self = Self(
        Self::BUS_ERROR.0
            | Self::RX_QUEUE_FULL.0
            | Self::ERR_PASSIVE.0
            | Self::BUS_OFF.0
            | Self::RX_FIFO_OVERRUN.0,
    );

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for AlertMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for AlertMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Static description of the bus attachment.
///
/// The monitor never drives the bus: operating mode is fixed to listen-only,
/// the acceptance filter is fixed to accept-all, and the transmit queue depth
/// is fixed to zero. Only the knobs that vary between installations are
/// configurable here.
#[derive(Debug, Clone)]
pub struct BusConfig {
    pub bit_rate: BitRate,
    pub tx_pin: i32,
    pub rx_pin: i32,
    /// Receive queue depth; bounds how many frames may wait for the receiver
    /// task before the controller starts dropping.
    pub rx_queue_len: u32,
    pub alerts: AlertMask,
}

impl BusConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn bit_rate(mut self, bit_rate: BitRate) -> Self {
        self.bit_rate = bit_rate;
        self
    }

    #[must_use]
    pub fn pins(mut self, tx: i32, rx: i32) -> Self {
        self.tx_pin = tx;
        self.rx_pin = rx;
        self
    }

    #[must_use]
    pub fn rx_queue_len(mut self, len: u32) -> Self {
        debug_assert!(len > 0, "receive queue must hold at least one frame");
        self.rx_queue_len = len;
        self
    }

    #[must_use]
    pub fn alerts(mut self, alerts: AlertMask) -> Self {
        self.alerts = alerts;
        self
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            bit_rate: BitRate::B125K,
            tx_pin: 5,
            rx_pin: 4,
            rx_queue_len: 5,
            alerts: AlertMask::ANOMALIES,
        }
    }
}

/// Outcome of one bounded receive wait.
#[derive(Debug, Clone, Copy)]
pub enum RxEvent {
    /// A frame was taken from the receive queue.
    Frame(CanFrame),
    /// The wait elapsed with nothing to read.
    Idle,
    /// The controller raised one or more of the configured alert bits.
    Anomaly(AlertMask),
}

/// An installed CAN controller the receiver task can drain.
///
/// Installation is a fallible constructor (see [`crate::canbus::CanBus::start`]);
/// `start` must be called before the first `receive`.
pub trait BusDriver: Send + 'static {
    type Error: std::error::Error + Send + 'static;

    /// Bring the installed controller online.
    fn start(&mut self) -> Result<(), Self::Error>;

    /// Wait up to `wait` for the next event.
    ///
    /// Pending alerts are reported before frames so queue overruns are not
    /// deferred behind a full receive queue.
    fn receive(&mut self, wait: Duration) -> Result<RxEvent, Self::Error>;
}

/// Why bus startup failed. Install and start failures are fatal; the caller
/// aborts initialization rather than retrying.
#[derive(Debug)]
pub enum StartError<E> {
    /// Installing the driver failed; pins and queues were not claimed.
    Install(E),
    /// The driver installed but refused to go on-bus.
    Start(E),
    /// The receiver task could not be spawned.
    Spawn(std::io::Error),
}

impl<E: fmt::Display> fmt::Display for StartError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Install(e) => write!(f, "installing the CAN driver failed: {e}"),
            Self::Start(e) => write!(f, "starting the CAN driver failed: {e}"),
            Self::Spawn(e) => write!(f, "spawning the receive task failed: {e}"),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for StartError<E> {}
