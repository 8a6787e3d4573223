use crate::field::{FieldError, MAX_INT_BITS};

/// Minimal number of bits needed to hold `value` in two's complement, sign bit
/// included. Zero and `-1` need a single bit.
fn signed_bit_length(value: i128) -> u32 {
    let magnitude_bits = if value < 0 {
        i128::BITS - (!value).leading_zeros()
    } else {
        i128::BITS - value.leading_zeros()
    };
    magnitude_bits + 1
}

/// Returns the smallest supported width (4, 8, 16, 32 or 64) able to hold `value`
/// as a signed integer, or `None` when the value needs more than 64 bits.
///
/// Candidate widths are `2 << x` for `x = 1, 2, ...`; the first one not exceeded by
/// the value's two's-complement length wins.
pub fn bit_width(value: i128) -> Option<u32> {
    let needed = signed_bit_length(value);
    (1..)
        .map(|shift| 2u32 << shift)
        .take_while(|width| *width <= MAX_INT_BITS)
        .find(|width| needed <= *width)
}

/// Like [`bit_width`], but reports an oversized value as a construction error for `field`.
pub fn infer_bits(field: &str, value: i128) -> Result<u32, FieldError> {
    bit_width(value).ok_or_else(|| FieldError::IntegerTooWide {
        field: field.to_string(),
        value,
        bits: MAX_INT_BITS,
    })
}
