#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]

use embassy_executor::Spawner;
use embassy_futures::select::{Either, select};
use embassy_time::{Duration, Instant, Timer};
use esp_alloc as _;
use esp_backtrace as _;
use esp_hal::clock::CpuClock;
use esp_hal::ram;
use esp_hal::rng::Rng;
use esp_hal::timer::timg::{MwdtStage, TimerGroup};
use esp_radio::Controller;

use embassy_net::Stack;
use embassy_sync::{blocking_mutex::raw::NoopRawMutex, mutex::Mutex};
use log::{error, info};

use soil_telemetry::payload::{self, DeviceId};
use soil_telemetry::reading::MoistureCell;

use esp_soil_http::report::{Reporter, TrustAnchor};
use esp_soil_http::wifi::Wifi;
use esp_soil_http::{
    REPORT_PERIOD, RX_BUFFER_SIZE, TLS_BUFFER_SIZE, TX_BUFFER_SIZE, sampler,
};

use static_cell::StaticCell;

// When you are okay with using a nightly compiler it's better to use https://docs.rs/static_cell/2.1.0/static_cell/macro.make_static.html
macro_rules! mk_static {
    ($t:ty,$val:expr) => {{
        static STATIC_CELL: static_cell::StaticCell<$t> = static_cell::StaticCell::new();
        #[deny(unused_attributes)]
        let x = STATIC_CELL.uninit().write($val);
        x
    }};
}

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

static RX_BUF: StaticCell<Mutex<NoopRawMutex, [u8; RX_BUFFER_SIZE]>> = StaticCell::new();
static TX_BUF: StaticCell<Mutex<NoopRawMutex, [u8; TX_BUFFER_SIZE]>> = StaticCell::new();
static TLS_READ_BUF: StaticCell<[u8; TLS_BUFFER_SIZE]> = StaticCell::new();
static TLS_WRITE_BUF: StaticCell<[u8; TLS_BUFFER_SIZE]> = StaticCell::new();
static SHARED_STACK: StaticCell<Mutex<NoopRawMutex, Stack<'static>>> = StaticCell::new();

static MOISTURE: MoistureCell = MoistureCell::new();

#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    esp_println::logger::init_logger_from_env();
    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    esp_alloc::heap_allocator!(#[ram(reclaimed)] size: 72 * 1024);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    // Arm watchdog timer. The stage covers a full reporting period plus a
    // stalled request; the reporter loop feeds it once per cycle.
    let mut wdt = timg0.wdt;
    wdt.set_timeout(
        MwdtStage::Stage0,
        esp_hal::time::Duration::from_millis(120_000),
    );
    wdt.enable();
    wdt.feed();

    let rng = Rng::new();
    let radio_init = &*mk_static!(
        Controller<'static>,
        esp_radio::init().expect("Failed to init radio")
    );
    let wifi = Wifi::new(radio_init, peripherals.WIFI, rng, spawner)
        .expect("Failed to initialize Wi-Fi");

    wdt.feed();

    let a = wifi.wait_ready();
    let b = Timer::after(Duration::from_secs(30));
    match select(a, b).await {
        Either::First(_) => info!("Connected to AP, begin sending data"),
        Either::Second(_) => panic!("Timed out waiting for the network"),
    }

    wdt.feed();

    // Identity is fixed at startup and reused for every report.
    let device = DeviceId::new(wifi.mac);
    info!("Device identity: {device}");

    let (adc, probe) = sampler::init(peripherals.ADC1, peripherals.GPIO34);
    spawner
        .spawn(sampler::sample_task(adc, probe, &MOISTURE))
        .expect("Failed to spawn sampler");

    let shared_stack = SHARED_STACK.init(Mutex::new(wifi.stack));
    // Sockets cannot share the buffers, so users have to make sure that the socket is
    // closed before releasing the mutex.
    let rx_buf = RX_BUF.init(Mutex::new([0; RX_BUFFER_SIZE]));
    let tx_buf = TX_BUF.init(Mutex::new([0; TX_BUFFER_SIZE]));
    let tls_read = TLS_READ_BUF.init([0; TLS_BUFFER_SIZE]);
    let tls_write = TLS_WRITE_BUF.init([0; TLS_BUFFER_SIZE]);

    let mut reporter = Reporter::new(
        shared_stack,
        rx_buf,
        tx_buf,
        tls_read,
        tls_write,
        TrustAnchor::none(),
        rng,
    );

    loop {
        wdt.feed();

        let moisture = MOISTURE.load();
        let timestamp = Instant::now().as_millis();
        match payload::build(timestamp, moisture, &device) {
            Ok(body) => {
                info!("{}", body.as_str());
                if let Err(e) = reporter.send(body.as_bytes()).await {
                    error!("Report failed: {:?}", e);
                }
            }
            Err(e) => error!("Payload build failed: {:?}", e),
        }

        Timer::after(REPORT_PERIOD).await;
    }
}
