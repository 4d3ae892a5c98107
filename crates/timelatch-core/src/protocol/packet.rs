//! Packet encoding/decoding
//!
//! Implements the two fixed-layout binary packets of the time-latch
//! protocol:
//!
//! Trigger request (13 bytes, outbound):
//! - 3 bytes: header `"$MC"`
//! - 3 bytes: start delay in ms (little-endian, low 24 bits)
//! - 2 bytes: pulse width in ms (little-endian)
//! - 2 bytes: pulse count (little-endian)
//! - 1 byte:  checksum (masked sum of all preceding bytes)
//! - 2 bytes: terminator CR LF
//!
//! Timemark report (22 bytes, inbound):
//! - 3 bytes: header `"$MC"`
//! - 1 byte:  pulse serial number
//! - rising-edge timestamp: year(2) month(1) day(1) hour(1) minute(1)
//!   second(1) millisecond(2) ten-microsecond(1)
//! - measured pulse width: second(2) millisecond(2) ten-microsecond(1)
//! - 1 byte:  checksum (same rule)
//! - 2 bytes: terminator CR LF
//!
//! Multi-byte fields are little-endian as emitted by the device.

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

use super::{ProtocolError, FRAME_HEADER, FRAME_TERMINATOR, TIMEMARK_LEN, TRIGGER_LEN};

/// Offset of the checksum byte in a trigger packet
const TRIGGER_CHECKSUM_POS: usize = TRIGGER_LEN - 3;

/// Offset of the checksum byte in a timemark packet
const TIMEMARK_CHECKSUM_POS: usize = TIMEMARK_LEN - 3;

/// Compute the protocol checksum: wrapping byte sum, low 7 bits kept
pub fn masked_sum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b)) & 0x7F
}

/// An exposure trigger request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerPacket {
    /// Delay from receipt to the first pulse, in milliseconds.
    /// Only the low 24 bits are representable on the wire.
    pub start_delay_ms: u32,
    /// Pulse width in milliseconds
    pub pulse_width_ms: u16,
    /// Number of pulses to fire
    pub pulse_count: u16,
}

impl TriggerPacket {
    /// Create a trigger request
    pub fn new(start_delay_ms: u32, pulse_width_ms: u16, pulse_count: u16) -> Self {
        Self {
            start_delay_ms,
            pulse_width_ms,
            pulse_count,
        }
    }

    /// Encode to the 13-byte wire layout, checksum and terminator included
    pub fn to_bytes(&self) -> [u8; TRIGGER_LEN] {
        let mut bytes = [0u8; TRIGGER_LEN];
        bytes[0..3].copy_from_slice(&FRAME_HEADER);
        // 24-bit little-endian start delay; bits above 24 do not fit
        bytes[3] = self.start_delay_ms as u8;
        bytes[4] = (self.start_delay_ms >> 8) as u8;
        bytes[5] = (self.start_delay_ms >> 16) as u8;
        LittleEndian::write_u16(&mut bytes[6..8], self.pulse_width_ms);
        LittleEndian::write_u16(&mut bytes[8..10], self.pulse_count);
        bytes[TRIGGER_CHECKSUM_POS] = masked_sum(&bytes[..TRIGGER_CHECKSUM_POS]);
        bytes[TRIGGER_LEN - 2..].copy_from_slice(&FRAME_TERMINATOR);
        bytes
    }
}

/// A decoded timemark report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimemarkRecord {
    /// Pulse serial number assigned by the device
    pub serial_no: u8,
    /// Rising-edge year
    pub year: u16,
    /// Rising-edge month
    pub month: u8,
    /// Rising-edge day of month
    pub day: u8,
    /// Rising-edge hour
    pub hour: u8,
    /// Rising-edge minute
    pub minute: u8,
    /// Rising-edge whole second
    pub second: u8,
    /// Rising-edge millisecond part
    pub millisecond: u16,
    /// Rising-edge fraction below 1 ms, in 10 us units
    pub ten_microsecond: u8,
    /// Measured pulse width, whole seconds
    pub width_second: u16,
    /// Measured pulse width, millisecond part
    pub width_millisecond: u16,
    /// Measured pulse width fraction below 1 ms, in 10 us units
    pub width_ten_microsecond: u8,
}

impl TimemarkRecord {
    /// Decode a timemark from raw bytes.
    ///
    /// Fails with [`ProtocolError::LengthMismatch`] unless `data` is
    /// exactly 22 bytes, and with [`ProtocolError::ChecksumMismatch`]
    /// when the embedded checksum disagrees with the masked sum of the
    /// preceding bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() != TIMEMARK_LEN {
            return Err(ProtocolError::LengthMismatch {
                expected: TIMEMARK_LEN,
                actual: data.len(),
            });
        }

        let expected = masked_sum(&data[..TIMEMARK_CHECKSUM_POS]);
        let actual = data[TIMEMARK_CHECKSUM_POS];
        if expected != actual {
            return Err(ProtocolError::ChecksumMismatch { expected, actual });
        }

        Ok(Self {
            serial_no: data[3],
            year: LittleEndian::read_u16(&data[4..6]),
            month: data[6],
            day: data[7],
            hour: data[8],
            minute: data[9],
            second: data[10],
            millisecond: LittleEndian::read_u16(&data[11..13]),
            ten_microsecond: data[13],
            width_second: LittleEndian::read_u16(&data[14..16]),
            width_millisecond: LittleEndian::read_u16(&data[16..18]),
            width_ten_microsecond: data[18],
        })
    }

    /// Second-of-minute of the rising edge, fractional
    pub fn asc_second(&self) -> f64 {
        self.second as f64 + self.millisecond as f64 * 0.001 + self.ten_microsecond as f64 * 1.0e-5
    }

    /// Measured pulse width in seconds
    pub fn pulse_width(&self) -> f64 {
        self.width_second as f64
            + self.width_millisecond as f64 * 0.001
            + self.width_ten_microsecond as f64 * 1.0e-5
    }

    /// Rising-edge instant formatted as `YYYY-MM-DDThh:mm:ss.sssss`
    pub fn timestamp(&self) -> String {
        format!(
            "{}-{:02}-{:02}T{:02}:{:02}:{:08.5}",
            self.year,
            self.month,
            self.day,
            self.hour,
            self.minute,
            self.asc_second()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// A well-formed timemark frame: 2024-06-01T10:30:15.500, serial 7,
    /// measured width exactly 1 s.
    fn sample_timemark() -> [u8; TIMEMARK_LEN] {
        let mut bytes = [0u8; TIMEMARK_LEN];
        bytes[0..3].copy_from_slice(&FRAME_HEADER);
        bytes[3] = 7;
        LittleEndian::write_u16(&mut bytes[4..6], 2024);
        bytes[6] = 6;
        bytes[7] = 1;
        bytes[8] = 10;
        bytes[9] = 30;
        bytes[10] = 15;
        LittleEndian::write_u16(&mut bytes[11..13], 500);
        bytes[13] = 0;
        LittleEndian::write_u16(&mut bytes[14..16], 1);
        LittleEndian::write_u16(&mut bytes[16..18], 0);
        bytes[18] = 0;
        bytes[TIMEMARK_CHECKSUM_POS] = masked_sum(&bytes[..TIMEMARK_CHECKSUM_POS]);
        bytes[TIMEMARK_LEN - 2..].copy_from_slice(&FRAME_TERMINATOR);
        bytes
    }

    #[test]
    fn trigger_wire_layout() {
        let packet = TriggerPacket::new(1000, 1000, 1);
        let bytes = packet.to_bytes();

        assert_eq!(
            bytes,
            [
                b'$', b'M', b'C', // header
                0xE8, 0x03, 0x00, // 1000 ms delay, 24-bit LE
                0xE8, 0x03, // 1000 ms width
                0x01, 0x00, // 1 pulse
                0x0B, // checksum
                0x0D, 0x0A, // terminator
            ]
        );
    }

    #[test]
    fn trigger_checksum_matches_independent_sum() {
        for (delay, width, count) in [(0, 0, 0), (1000, 1000, 1), (0xFF_FFFF, u16::MAX, 500)] {
            let bytes = TriggerPacket::new(delay, width, count).to_bytes();
            let mut sum: u32 = 0;
            for b in &bytes[..10] {
                sum += *b as u32;
            }
            assert_eq!(bytes[10], (sum % 256) as u8 & 0x7F);
        }
    }

    #[test]
    fn trigger_delay_truncates_to_24_bits() {
        let bytes = TriggerPacket::new(0x0100_0001, 0, 0).to_bytes();
        assert_eq!(&bytes[3..6], &[0x01, 0x00, 0x00]);
    }

    #[test]
    fn timemark_decode() {
        let mark = TimemarkRecord::from_bytes(&sample_timemark()).expect("valid frame");

        assert_eq!(mark.serial_no, 7);
        assert_eq!(mark.year, 2024);
        assert_eq!(mark.month, 6);
        assert_eq!(mark.day, 1);
        assert_eq!(mark.hour, 10);
        assert_eq!(mark.minute, 30);
        assert!((mark.asc_second() - 15.5).abs() < 1.0e-9);
        assert!((mark.pulse_width() - 1.0).abs() < 1.0e-9);
        assert_eq!(mark.timestamp(), "2024-06-01T10:30:15.50000");
    }

    #[test]
    fn timemark_wrong_length_is_never_a_checksum_error() {
        let frame = sample_timemark();
        for len in [0, 1, TIMEMARK_LEN - 1, TIMEMARK_LEN + 1] {
            let mut data = frame.to_vec();
            data.resize(len, 0);
            match TimemarkRecord::from_bytes(&data) {
                Err(ProtocolError::LengthMismatch { expected, actual }) => {
                    assert_eq!(expected, TIMEMARK_LEN);
                    assert_eq!(actual, len);
                }
                other => panic!("expected length error for len {}, got {:?}", len, other),
            }
        }
    }

    #[test]
    fn timemark_rejects_low_bit_flips() {
        // Flipping any bit that contributes to the 7-bit masked sum must
        // be caught. Bit 7 of a single byte is outside the mask.
        let frame = sample_timemark();
        for pos in 0..TIMEMARK_CHECKSUM_POS {
            let mut corrupt = frame;
            corrupt[pos] ^= 0x01;
            assert!(
                matches!(
                    TimemarkRecord::from_bytes(&corrupt),
                    Err(ProtocolError::ChecksumMismatch { .. })
                ),
                "bit flip at byte {} not detected",
                pos
            );
        }
    }

    #[test]
    fn timemark_accepts_any_valid_checksum() {
        // Corrupt a field but re-seal the checksum: decoding succeeds and
        // reflects the corrupted field, proving the check is the masked
        // sum and nothing else.
        let mut frame = sample_timemark();
        frame[3] = 99;
        frame[TIMEMARK_CHECKSUM_POS] = masked_sum(&frame[..TIMEMARK_CHECKSUM_POS]);
        let mark = TimemarkRecord::from_bytes(&frame).expect("resealed frame");
        assert_eq!(mark.serial_no, 99);
    }
}
