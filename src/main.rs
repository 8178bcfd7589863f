#[cfg(target_os = "espidf")]
fn main() {
    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    run().unwrap();
}

#[cfg(target_os = "espidf")]
fn run() -> anyhow::Result<()> {
    use anyhow::Context as _;
    use canwatch::bus::BusConfig;
    use canwatch::canbus::CanBus;
    use canwatch::rx::{CanLog, RxTaskOptions};
    use canwatch::twai::TwaiBus;
    use esp_idf_hal::delay::FreeRtos;

    let _bus = CanBus::start(
        BusConfig::default(),
        RxTaskOptions::default(),
        TwaiBus::install,
        CanLog,
    )
    .context("CAN bus startup failed")?;

    // Frames are logged by the receive task; the main task has nothing left
    // to do but stay alive.
    loop {
        FreeRtos::delay_ms(1000);
    }
}

#[cfg(not(target_os = "espidf"))]
fn main() {
    eprintln!("canwatch is ESP32 firmware; build it for the espidf target");
}
