//! MMC5983MA register map

pub const I2C_ADDRESS: u16 = 0x30;

pub const X_OUT_0: u8 = 0x00;
pub const T_OUT: u8 = 0x07;
pub const STATUS: u8 = 0x08;
pub const INTERNAL_CONTROL_0: u8 = 0x09;
pub const INTERNAL_CONTROL_1: u8 = 0x0A;
pub const INTERNAL_CONTROL_2: u8 = 0x0B;
pub const PRODUCT_ID: u8 = 0x2F;

pub const PRODUCT_ID_VALUE: u8 = 0x30;

/// X0..Z1 plus the shared low bits in XYZ_OUT_2
pub const OUTPUT_LEN: usize = 7;

// STATUS
pub const MEAS_M_DONE: u8 = 0x01;
pub const MEAS_T_DONE: u8 = 0x02;

// INTERNAL_CONTROL_0 (write only)
pub const TM_M: u8 = 0x01;
pub const TM_T: u8 = 0x02;
pub const SET_OPERATION: u8 = 0x08;
pub const RESET_OPERATION: u8 = 0x10;

// INTERNAL_CONTROL_1 (write only)
pub const BANDWIDTH_MASK: u8 = 0x03;
pub const SW_RST: u8 = 0x80;

/// 18-bit output, mid-scale is zero field
pub const NULL_FIELD_COUNTS: f32 = 131_072.0;
pub const COUNTS_PER_GAUSS: f32 = 16_384.0;

pub const TEMPERATURE_ZERO_C: f32 = -75.0;
pub const DEGREES_PER_COUNT: f32 = 0.8;

/// Measurement bandwidth, INTERNAL_CONTROL_1 bits 1:0
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bandwidth {
    #[default]
    Hz100,
    Hz200,
    Hz400,
    Hz800,
}

impl Bandwidth {
    pub fn bits(self) -> u8 {
        match self {
            Bandwidth::Hz100 => 0b00,
            Bandwidth::Hz200 => 0b01,
            Bandwidth::Hz400 => 0b10,
            Bandwidth::Hz800 => 0b11,
        }
    }
}

/// Unpacks the 18-bit X, Y and Z counts from a burst read of X_OUT_0..=XYZ_OUT_2
pub fn unpack_counts(buf: &[u8; OUTPUT_LEN]) -> [u32; 3] {
    let low = buf[6];
    let axis = |hi: u8, mid: u8, shift: u8| {
        (u32::from(hi) << 10) | (u32::from(mid) << 2) | u32::from((low >> shift) & 0x03)
    };
    [
        axis(buf[0], buf[1], 6),
        axis(buf[2], buf[3], 4),
        axis(buf[4], buf[5], 2),
    ]
}

pub fn counts_to_gauss(counts: u32) -> f32 {
    (counts as f32 - NULL_FIELD_COUNTS) / COUNTS_PER_GAUSS
}

pub fn temperature_celsius(raw: u8) -> f32 {
    TEMPERATURE_ZERO_C + f32::from(raw) * DEGREES_PER_COUNT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unpack_uses_low_bits_per_axis() {
        // x = 0x20000 (null), y = max, z = 1
        let buf = [0x80, 0x00, 0xFF, 0xFF, 0x00, 0x00, 0b00_11_01_00];

        assert_eq!(unpack_counts(&buf), [0x20000, 0x3FFFF, 0x1]);
    }

    #[test]
    fn null_field_is_zero_gauss() {
        assert_eq!(counts_to_gauss(131_072), 0.0);
        assert_eq!(counts_to_gauss(131_072 + 16_384), 1.0);
        assert_eq!(counts_to_gauss(131_072 - 8_192), -0.5);
    }

    #[test]
    fn temperature_scale() {
        assert_eq!(temperature_celsius(0), -75.0);
        assert!((temperature_celsius(125) - 25.0).abs() < 1e-4);
    }
}
