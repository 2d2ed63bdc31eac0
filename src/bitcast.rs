//! Bit-level reinterpretation between floating point and integer words
//!
//! Kernels exchange raw bit patterns through integer buffers, so a double is
//! carried as two 32-bit words and a float as one. The word order of
//! [`f64_to_words`] matches `as_uint2()` on a little-endian device: `[0]` is
//! the low half.

/// Reinterpret a float as its IEEE-754 bit pattern.
#[inline]
pub fn f32_to_bits(value: f32) -> u32 {
    value.to_bits()
}

#[inline]
pub fn bits_to_f32(bits: u32) -> f32 {
    f32::from_bits(bits)
}

/// Split a double into `[low, high]` 32-bit words.
#[inline]
pub fn f64_to_words(value: f64) -> [u32; 2] {
    let bits = value.to_bits();
    [bits as u32, (bits >> 32) as u32]
}

/// Reassemble a double from `[low, high]` words.
#[inline]
pub fn words_to_f64(words: [u32; 2]) -> f64 {
    f64::from_bits(u64::from(words[0]) | (u64::from(words[1]) << 32))
}

pub fn f32_slice_to_bits(values: &[f32]) -> Vec<u32> {
    values.iter().map(|v| v.to_bits()).collect()
}

pub fn bits_to_f32_vec(bits: &[u32]) -> Vec<f32> {
    bits.iter().copied().map(f32::from_bits).collect()
}

/// Flatten doubles into interleaved `low, high` words.
pub fn f64_slice_to_words(values: &[f64]) -> Vec<u32> {
    values.iter().flat_map(|&v| f64_to_words(v)).collect()
}

/// Inverse of [`f64_slice_to_words`]. A trailing odd word is ignored.
pub fn words_to_f64_vec(words: &[u32]) -> Vec<f64> {
    words
        .chunks_exact(2)
        .map(|pair| words_to_f64([pair[0], pair[1]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0.0)]
    #[case(-0.0)]
    #[case(1.5)]
    #[case(f32::MIN_POSITIVE)]
    #[case(f32::INFINITY)]
    fn test_f32_bits_preserved(#[case] value: f32) {
        assert_eq!(bits_to_f32(f32_to_bits(value)).to_bits(), value.to_bits());
    }

    #[test]
    fn test_f32_known_pattern() {
        assert_eq!(f32_to_bits(1.0), 0x3f80_0000);
        assert_eq!(bits_to_f32(0xc000_0000), -2.0);
    }

    #[test]
    fn test_f64_word_order() {
        // 1.0 = 0x3FF0_0000_0000_0000
        assert_eq!(f64_to_words(1.0), [0, 0x3ff0_0000]);
        assert_eq!(words_to_f64([0, 0x3ff0_0000]), 1.0);

        let v = f64::from_bits(0x0123_4567_89ab_cdef);
        assert_eq!(f64_to_words(v), [0x89ab_cdef, 0x0123_4567]);
    }

    #[test]
    fn test_nan_payload_survives() {
        let nan = f64::from_bits(0x7ff8_0000_dead_beef);
        assert_eq!(words_to_f64(f64_to_words(nan)).to_bits(), nan.to_bits());
    }

    #[test]
    fn test_slice_helpers() {
        let doubles = [1.0, -3.25, 1e-300];
        let words = f64_slice_to_words(&doubles);
        assert_eq!(words.len(), 6);
        assert_eq!(words_to_f64_vec(&words), doubles);

        let floats = [0.5f32, 2.0];
        assert_eq!(bits_to_f32_vec(&f32_slice_to_bits(&floats)), floats);
    }

    #[test]
    fn test_odd_word_count_drops_tail() {
        let words = [0, 0x3ff0_0000, 7];
        assert_eq!(words_to_f64_vec(&words), vec![1.0]);
    }
}
