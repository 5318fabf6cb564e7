//! JSON telemetry payload, built fresh for every report cycle.

use core::fmt::{self, Write};

use heapless::String;

/// Upper bound for one serialized report.
pub const PAYLOAD_CAPACITY: usize = 100;

/// Stable device identity derived from the station MAC address.
///
/// Computed once at startup and handed to the reporter; rendered as
/// lowercase colon-separated hex octets.
#[derive(Clone, Copy)]
pub struct DeviceId([u8; 6]);

impl DeviceId {
    pub const fn new(mac: [u8; 6]) -> Self {
        DeviceId(mac)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum PayloadError {
    /// The rendered payload would exceed [`PAYLOAD_CAPACITY`]. Surfaced
    /// instead of truncating so the backend never sees cut-off JSON.
    Overflow,
}

/// Render one report as JSON.
///
/// Moisture is pinned to six fractional digits so the wire format stays
/// stable regardless of the value's magnitude.
pub fn build(
    timestamp_ms: u64,
    moisture: f32,
    device: &DeviceId,
) -> Result<String<PAYLOAD_CAPACITY>, PayloadError> {
    let mut out = String::new();
    write!(
        out,
        "{{\"timestamp\":\"{timestamp_ms}\",\"moisture\":\"{moisture:.6}\",\"profile\":\"{device}\"}}"
    )
    .map_err(|_| PayloadError::Overflow)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAC: [u8; 6] = [0x24, 0x0a, 0xc4, 0x12, 0x34, 0x56];

    #[test]
    fn golden_output() {
        let body = build(123456, 42.5, &DeviceId::new(MAC)).unwrap();
        assert_eq!(
            body.as_str(),
            "{\"timestamp\":\"123456\",\"moisture\":\"42.500000\",\"profile\":\"24:0a:c4:12:34:56\"}"
        );
    }

    #[test]
    fn round_trips_through_json() {
        let body = build(987654321, 17.25, &DeviceId::new(MAC)).unwrap();
        let value: serde_json::Value = serde_json::from_str(body.as_str()).unwrap();
        assert_eq!(value["timestamp"], "987654321");
        assert_eq!(value["profile"], "24:0a:c4:12:34:56");
        let moisture: f32 = value["moisture"].as_str().unwrap().parse().unwrap();
        assert_eq!(moisture, 17.25);
    }

    #[test]
    fn overflow_is_an_error_not_a_truncation() {
        assert_eq!(
            build(u64::MAX, f32::MAX, &DeviceId::new(MAC)),
            Err(PayloadError::Overflow)
        );
    }

    #[test]
    fn identity_formatting_pads_octets() {
        let id = DeviceId::new([0x00, 0x01, 0x0a, 0xff, 0x10, 0x02]);
        let mut text = heapless::String::<17>::new();
        core::fmt::write(&mut text, format_args!("{id}")).unwrap();
        assert_eq!(text.as_str(), "00:01:0a:ff:10:02");
    }
}
