//! Passive CAN-bus monitor for the ESP32's TWAI controller.
//!
//! The controller is configured in listen-only mode with an accept-all
//! filter; a dedicated receive task drains the hardware queue and logs each
//! frame as a hex dump. Startup is sequenced through a one-shot gate so the
//! task exists before the controller goes on-bus and no early frame is lost.

pub mod bus;
pub mod canbus;
pub mod frame;
pub mod render;
pub mod rx;
pub mod sync;
#[cfg(target_os = "espidf")]
pub mod twai;

pub use bus::{AlertMask, BitRate, BusConfig, BusDriver, RxEvent, StartError};
pub use canbus::CanBus;
pub use frame::CanFrame;
pub use render::FrameRenderer;
pub use rx::{CanLog, Core, EventLog, RxTaskOptions};
