use fixed::types::I32F32;

/// Q32.32 fixed-point: 32 integer bits, 32 fractional bits.
pub type Fixed64 = I32F32;

/// Ticks are the atomic unit of simulation time.
pub type Ticks = u64;

/// Fraction `part / whole` as a fixed-point value in `[0, 1]`.
///
/// A zero `whole` yields zero. Use for display only, never in the sim loop.
#[inline]
pub fn fraction(part: u32, whole: u32) -> Fixed64 {
    if whole == 0 {
        return Fixed64::ZERO;
    }
    let part = u64::from(part.min(whole));
    // part <= whole, so the quotient is at most 1 << 32 and fits the bits.
    let bits = (part << 32) / u64::from(whole);
    Fixed64::from_bits(bits as i64)
}

/// Convert Fixed64 to f64. Use only for display/FFI.
#[inline]
pub fn fixed64_to_f64(v: Fixed64) -> f64 {
    v.to_num::<f64>()
}
