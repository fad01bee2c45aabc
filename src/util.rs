//! Alignment and rounding helpers shared by the allocator, transport, and
//! cycle driver. Grounded in `fgc::util`'s small free-function style.

use crate::config::TRIM_ALIGNMENT;

/// §3 invariant 4: "General-area allocations are always padded to an even
/// word count."
pub fn pad_to_even_words(size_words: usize) -> usize {
    size_words + (size_words & 1)
}

/// §4.8 step 11: "round bump to a 2 MiB boundary".
pub fn round_up_to_trim_boundary(addr: usize) -> usize {
    round_up(addr, TRIM_ALIGNMENT)
}

pub fn round_up(value: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (value + align - 1) & !(align - 1)
}

pub fn round_down(value: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    value & !(align - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn even_word_padding() {
        assert_eq!(pad_to_even_words(4), 4);
        assert_eq!(pad_to_even_words(5), 6);
    }

    #[test]
    fn trim_boundary() {
        assert_eq!(round_up_to_trim_boundary(0), 0);
        assert_eq!(round_up_to_trim_boundary(1), TRIM_ALIGNMENT);
        assert_eq!(round_up_to_trim_boundary(TRIM_ALIGNMENT), TRIM_ALIGNMENT);
    }
}
