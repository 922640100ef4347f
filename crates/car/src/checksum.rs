use crc::{CRC_32_ISO_HDLC, Crc, Digest};

static HASHER: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Streaming CRC-32 over the IEEE polynomial (0xEDB88320, reflected,
/// init and final XOR 0xFFFFFFFF). Both archive checksums use it.
pub struct Crc32 {
    digest: Digest<'static, u32>,
}

impl Crc32 {
    pub fn new() -> Self {
        Self {
            digest: HASHER.digest(),
        }
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.digest.update(bytes);
    }

    pub fn finalize(self) -> u32 {
        self.digest.finalize()
    }

    /// One-shot helper, equivalent to `new` + `update` + `finalize`.
    pub fn checksum(bytes: &[u8]) -> u32 {
        HASHER.checksum(bytes)
    }
}

impl Default for Crc32 {
    fn default() -> Self {
        Self::new()
    }
}

/// Checksums `region` while skipping the 4-byte checksum slot at
/// `slot_offset`, so a header can be verified against its own stored value.
pub fn region_checksum_skipping_slot(region: &[u8], slot_offset: usize) -> u32 {
    let mut crc = Crc32::new();
    crc.update(&region[..slot_offset]);
    crc.update(&region[slot_offset + 4..]);
    crc.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector() {
        // The standard CRC-32 check value.
        assert_eq!(Crc32::checksum(b"123456789"), 0xCBF43926);
    }

    #[test]
    fn streaming_matches_one_shot() {
        let mut crc = Crc32::new();
        crc.update(b"1234");
        crc.update(b"56789");
        assert_eq!(crc.finalize(), Crc32::checksum(b"123456789"));
    }

    #[test]
    fn slot_is_excluded() {
        let mut region = [0xAAu8; 32];
        let a = region_checksum_skipping_slot(&region, 12);
        region[12..16].copy_from_slice(&[1, 2, 3, 4]);
        let b = region_checksum_skipping_slot(&region, 12);
        assert_eq!(a, b);
        region[20] ^= 0xFF;
        assert_ne!(a, region_checksum_skipping_slot(&region, 12));
    }
}
