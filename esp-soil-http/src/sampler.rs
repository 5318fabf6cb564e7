//! Continuous soil probe sampling.
//!
//! The probe sits on ADC1 channel 6 (GPIO34). Every cycle reads one raw
//! count, converts it through the calibration formula, and overwrites the
//! shared reading; the reporter picks up whatever was written last.

use embassy_time::Timer;
use esp_hal::Blocking;
use esp_hal::analog::adc::{Adc, AdcConfig, AdcPin, Attenuation};
use esp_hal::peripherals::{ADC1, GPIO34};
use log::{error, info};

use soil_telemetry::moisture;
use soil_telemetry::reading::MoistureCell;

use crate::SAMPLE_PERIOD;

pub type MoistureAdc = Adc<'static, ADC1<'static>, Blocking>;
pub type ProbePin = AdcPin<GPIO34<'static>, ADC1<'static>>;

/// Configure ADC1 for the moisture probe: 12-bit width, 11 dB attenuation
/// for the probe's full output swing.
pub fn init(adc1: ADC1<'static>, pin: GPIO34<'static>) -> (MoistureAdc, ProbePin) {
    let mut config = AdcConfig::new();
    let probe = config.enable_pin(pin, Attenuation::_11dB);
    (Adc::new(adc1, config), probe)
}

#[embassy_executor::task]
pub async fn sample_task(
    mut adc: MoistureAdc,
    mut probe: ProbePin,
    cell: &'static MoistureCell,
) {
    info!("sampler: task started");
    loop {
        match adc.read_oneshot(&mut probe) {
            Ok(raw) => {
                let percent = moisture::percent(raw);
                info!("soil moisture: {percent} (raw {raw})");
                cell.store(percent);
            }
            Err(_) => error!("sampler: ADC read failed"),
        }
        Timer::after(SAMPLE_PERIOD).await;
    }
}
