//! Station bring-up. The rest of the firmware only sees the network
//! stack and the station MAC.

use esp_hal::rng::Rng;
use esp_radio::{
    Controller,
    wifi::{ClientConfig, ModeConfig, WifiController, WifiDevice, WifiEvent, WifiStaState},
};

use embassy_executor::Spawner;
use embassy_net::{DhcpConfig, Runner, Stack, StackResources};
use embassy_time::{Duration, Timer};
use heapless::String;
use log::{info, warn};
use static_cell::StaticCell;

use crate::{HOSTNAME, PASSWORD, SSID};

static RESOURCES: StaticCell<StackResources<4>> = StaticCell::new();

pub struct Wifi {
    pub stack: Stack<'static>,
    /// Station MAC, the device's stable identity.
    pub mac: [u8; 6],
}

#[derive(Debug)]
pub enum Error {
    ControllerInitFailed,
}

impl Wifi {
    pub fn new(
        radio_init: &'static Controller<'static>,
        wifi: esp_hal::peripherals::WIFI<'static>,
        rng: Rng,
        spawner: Spawner,
    ) -> Result<Self, Error> {
        let config = esp_radio::wifi::Config::default().with_rx_queue_size(10);
        let (wifi_controller, interfaces) = esp_radio::wifi::new(radio_init, wifi, config)
            .map_err(|_| Error::ControllerInitFailed)?;

        let wifi_interface = interfaces.sta;
        let mac = wifi_interface.mac_address();

        let mut dhcp_config: DhcpConfig = Default::default();
        let hostname: String<32> = String::try_from(HOSTNAME).unwrap();
        dhcp_config.hostname = Some(hostname);
        let config = embassy_net::Config::dhcpv4(dhcp_config);

        let seed = (rng.random() as u64) << 32 | rng.random() as u64;
        let resources = RESOURCES.init(StackResources::new());
        let (stack, runner) = embassy_net::new(wifi_interface, config, resources, seed);

        spawner.spawn(connection(wifi_controller)).ok();
        spawner.spawn(net_task(runner)).ok();

        Ok(Wifi { stack, mac })
    }

    /// Block until the link is up and DHCP handed out an address.
    pub async fn wait_ready(&self) {
        info!("Waiting for network to come up...");
        self.stack.wait_link_up().await;
        self.stack.wait_config_up().await;
        if let Some(config) = self.stack.config_v4() {
            info!("Got IP: {}", config.address);
        }
    }
}

#[embassy_executor::task]
async fn connection(mut controller: WifiController<'static>) {
    info!("Start connection task");
    loop {
        if esp_radio::wifi::sta_state() == WifiStaState::Connected {
            // wait until we're no longer connected
            controller.wait_for_event(WifiEvent::StaDisconnected).await;
            Timer::after(Duration::from_millis(5000)).await
        }
        if !matches!(controller.is_started(), Ok(true)) {
            let client_config = ModeConfig::Client(
                ClientConfig::default()
                    .with_ssid(SSID.into())
                    .with_password(PASSWORD.into()),
            );
            controller.set_config(&client_config).unwrap();
            info!("Starting wifi");
            controller.start_async().await.unwrap();
            info!("Wifi started!");
        }
        info!("About to connect...");

        match controller.connect_async().await {
            Ok(_) => info!("Wifi connected!"),
            Err(e) => {
                warn!("Failed to connect to wifi: {:?}", e);
                Timer::after(Duration::from_millis(5000)).await
            }
        }
    }
}

#[embassy_executor::task]
async fn net_task(mut runner: Runner<'static, WifiDevice<'static>>) {
    runner.run().await
}
