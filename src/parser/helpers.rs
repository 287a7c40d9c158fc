//! Helper functions for TLG payload decoding
//!
//! Sign extension and width truncation for the fixed-width integers found in
//! frame payloads. Widths are in bytes (1..=4).

/// Sign-extend an 8-bit value to i32
pub fn sign_extend_8bit(value: u8) -> i32 {
    value as i8 as i32
}

/// Sign-extend a 16-bit value to i32
pub fn sign_extend_16bit(value: u16) -> i32 {
    value as i16 as i32
}

/// Sign-extend a 24-bit value to i32
pub fn sign_extend_24bit(value: u32) -> i32 {
    if (value & 0x800000) != 0 {
        (value | 0xff000000) as i32
    } else {
        (value & 0x7fffff) as i32
    }
}

/// Sign-extend the low `width` bytes of `value`
pub fn sign_extend(value: u32, width: usize) -> i32 {
    match width {
        1 => sign_extend_8bit(value as u8),
        2 => sign_extend_16bit(value as u16),
        3 => sign_extend_24bit(value),
        _ => value as i32,
    }
}

/// Two's-complement bit pattern of `value` truncated to `width` bytes
pub fn truncate_to_width(value: i64, width: usize) -> u32 {
    match width {
        1 => (value as u32) & 0xff,
        2 => (value as u32) & 0xffff,
        3 => (value as u32) & 0xff_ffff,
        _ => value as u32,
    }
}

/// Inclusive value range representable in `width` bytes
pub fn width_range(width: usize, signed: bool) -> (i64, i64) {
    let bits = (width.clamp(1, 4) * 8) as u32;
    if signed {
        (-(1i64 << (bits - 1)), (1i64 << (bits - 1)) - 1)
    } else {
        (0, (1i64 << bits) - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_extend_8bit() {
        assert_eq!(sign_extend_8bit(0), 0);
        assert_eq!(sign_extend_8bit(127), 127);
        assert_eq!(sign_extend_8bit(128), -128);
        assert_eq!(sign_extend_8bit(255), -1);
    }

    #[test]
    fn test_sign_extend_16bit() {
        assert_eq!(sign_extend_16bit(0), 0);
        assert_eq!(sign_extend_16bit(32767), 32767);
        assert_eq!(sign_extend_16bit(32768), -32768);
        assert_eq!(sign_extend_16bit(65535), -1);
    }

    #[test]
    fn test_sign_extend_24bit() {
        assert_eq!(sign_extend_24bit(0), 0);
        assert_eq!(sign_extend_24bit(0x7FFFFF), 0x7FFFFF);
        assert_eq!(sign_extend_24bit(0x800000), -8388608);
        assert_eq!(sign_extend_24bit(0xFFFFFF), -1);
    }

    #[test]
    fn test_sign_extend_by_width() {
        assert_eq!(sign_extend(0xFF, 1), -1);
        assert_eq!(sign_extend(0xFFFE, 2), -2);
        assert_eq!(sign_extend(0xFFFFFFFD, 4), -3);
    }

    #[test]
    fn test_truncate_round_trips_negative_values() {
        assert_eq!(truncate_to_width(-1, 2), 0xFFFF);
        assert_eq!(sign_extend(truncate_to_width(-123_456, 3), 3), -123_456);
        assert_eq!(truncate_to_width(-502_345_678, 4) as i32, -502_345_678);
    }

    #[test]
    fn test_width_range() {
        assert_eq!(width_range(1, false), (0, 255));
        assert_eq!(width_range(2, true), (-32768, 32767));
        assert_eq!(width_range(4, true), (i32::MIN as i64, i32::MAX as i64));
    }
}
