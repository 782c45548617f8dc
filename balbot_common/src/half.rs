//! IEEE-754 binary16 conversions.
//!
//! Oscilloscope samples come off the device packed four-to-a-word as 16-bit
//! half-precision floats (1-bit sign, 5-bit exponent, 10-bit mantissa,
//! exponent bias 15). Decode expands to binary32 via explicit bit
//! manipulation; encode is the inverse and is used by the simulated device
//! and the round-trip tests. Infinity and NaN are not produced by the
//! device and are not round-trip exact here.

/// Expand a binary16 value to f32.
///
/// Three cases: signed zero, denormal (renormalized via a leading-zero
/// count obtained from the float conversion of the mantissa), and normal
/// (exponent rebias 15 → 127 with the mantissa shifted into place).
pub fn half_to_f32(h: u16) -> f32 {
    let e = u32::from(h & 0x7C00) >> 10;
    let m = u32::from(h & 0x03FF) << 13;
    let sign = u32::from(h & 0x8000) << 16;

    let bits = if e != 0 {
        // Normal: rebias exponent from 15 to 127.
        sign | ((e + 112) << 23) | m
    } else if m != 0 {
        // Denormal: count leading zeros of the mantissa by converting it
        // to a float and reading back the exponent field.
        let v = (m as f32).to_bits() >> 23;
        sign | ((v - 37) << 23) | ((m << (150 - v)) & 0x007F_E000)
    } else {
        // Signed zero.
        sign
    };
    f32::from_bits(bits)
}

/// Compress an f32 value to binary16, rounding the mantissa to nearest.
///
/// Values beyond the binary16 range saturate to the maximum finite
/// magnitude pattern; values below the smallest denormal flush to zero
/// with the sign preserved.
pub fn f32_to_half(f: f32) -> u16 {
    // Round mantissa by pre-adding half a ULP of the 10-bit target.
    let b = f.to_bits().wrapping_add(0x0000_1000);
    let e = (b & 0x7F80_0000) >> 23;
    let m = b & 0x007F_FFFF;
    let sign = ((f.to_bits() & 0x8000_0000) >> 16) as u16;

    if e > 143 {
        // Overflow: saturate.
        return sign | 0x7BFF;
    }
    if e > 112 {
        // Normal.
        return sign | ((((e - 112) << 10) & 0x7C00) | (m >> 13)) as u16;
    }
    if e > 101 {
        // Denormal: shift the implicit leading one into the mantissa.
        return sign | ((((0x007F_F000 + m) >> (125 - e)) + 1) >> 1) as u16;
    }
    // Underflow to signed zero.
    sign
}

// ─── Tests ──────────────────────────────────────────────────────────
