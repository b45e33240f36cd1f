use std::fmt;
use num_enum::TryFromPrimitive;
use crc32fast::Hasher;

/// CRC-32 (IEEE) of a single buffer.
pub fn compute_checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Per-block checksum state, so it can later be folded into a running
/// stream checksum with [`combine_checksum`].
pub fn block_checksum(data: &[u8]) -> Hasher {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher
}

/// Append `next` (covering the bytes that follow) onto `running`.
pub fn combine_checksum(running: &mut Hasher, next: &Hasher) {
    running.combine(next);
}

pub fn enum_name_or_hex<T>(raw: T::Primitive) -> String
where
    T: TryFromPrimitive + fmt::Debug,
    T::Primitive: fmt::LowerHex,
{
    match T::try_from_primitive(raw) {
        Ok(variant) => format!("{:?}", variant),
        Err(_) => format!("0x{:x}", raw),
    }
}

/// Ratio of two byte counts, 0.0 when the denominator is zero.
pub fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combined_block_checksums_match_whole_buffer() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let mut running = Hasher::new();
        for chunk in data.chunks(777) {
            combine_checksum(&mut running, &block_checksum(chunk));
        }
        assert_eq!(running.finalize(), compute_checksum(&data));
    }

    #[test]
    fn ratio_of_empty_is_zero() {
        assert_eq!(ratio(10, 0), 0.0);
        assert_eq!(ratio(5, 10), 0.5);
    }
}
