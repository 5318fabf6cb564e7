#![no_std]

pub mod report;
pub mod sampler;
pub mod wifi;

use embassy_time::Duration;

pub const RX_BUFFER_SIZE: usize = 4096;
pub const TX_BUFFER_SIZE: usize = 4096;

/// One full TLS record plus header overhead.
pub const TLS_BUFFER_SIZE: usize = 16640;

/// Fixed response buffer handed to the request engine each cycle.
pub const RESPONSE_BUFFER_SIZE: usize = 2048;

pub const SSID: &str = env!("SSID");
pub const PASSWORD: &str = env!("PASSWORD");

pub const SERVER_URL: &str = match option_env!("SERVER_URL") {
    Some(url) => url,
    None => "https://telemetry.example.com/",
};

pub const HOSTNAME: &str = "esp-soil-http";

/// How often the probe is sampled.
pub const SAMPLE_PERIOD: Duration = Duration::from_secs(2);

/// How often a reading is posted to the server.
pub const REPORT_PERIOD: Duration = Duration::from_secs(30);

#[unsafe(no_mangle)]
pub fn custom_halt() -> ! {
    esp_hal::system::software_reset();
}

#[unsafe(no_mangle)]
pub extern "Rust" fn _esp_println_timestamp() -> u64 {
    esp_hal::time::Instant::now()
        .duration_since_epoch()
        .as_millis()
}
