//! CRC-32 as used to frame announcement datagrams.
//!
//! Same reflected polynomial as zlib and Ethernet, so any standard
//! implementation produces identical 32-bit values.

use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;

const READ_BUFFER_SIZE: usize = 0x10000;

/// Computes the checksum of a byte range in one shot.
pub fn of(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Computes the checksum of everything a reader yields,
/// bounded by `limit` bytes when given.
pub async fn of_reader(
    reader: impl AsyncRead + Unpin,
    limit: Option<u64>,
) -> std::io::Result<u32> {
    let mut reader = reader.take(limit.unwrap_or(u64::MAX));
    let mut hasher = crc32fast::Hasher::new();
    let mut buffer = vec![0; READ_BUFFER_SIZE];
    loop {
        let read_size = reader.read(&mut buffer).await?;
        if read_size == 0 {
            break;
        }
        hasher.update(&buffer[..read_size]);
    }
    Ok(hasher.finalize())
}

/// Running CRC-32 that accepts input incrementally.
#[derive(Default)]
pub struct Crc32 {
    hasher: crc32fast::Hasher,
}

impl Crc32 {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    pub fn update_byte(&mut self, byte: u8) {
        self.hasher.update(&[byte]);
    }

    /// Checksum of everything fed so far. Feeding may continue afterwards.
    pub fn value(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    pub fn reset(&mut self) {
        self.hasher.reset();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const CHECK_INPUT: &[u8] = b"123456789";
    const CHECK_VALUE: u32 = 0xCBF4_3926;

    #[test]
    fn known_vector() {
        assert_eq!(of(CHECK_INPUT), CHECK_VALUE);
    }

    #[test]
    fn incremental_matches_one_shot() {
        let mut crc = Crc32::new();
        crc.update(&CHECK_INPUT[..4]);
        for byte in &CHECK_INPUT[4..] {
            crc.update_byte(*byte);
        }
        assert_eq!(crc.value(), CHECK_VALUE);
    }

    #[test]
    fn reset_restarts_the_computation() {
        let mut crc = Crc32::new();
        crc.update(b"garbage");
        crc.reset();
        crc.update(CHECK_INPUT);
        assert_eq!(crc.value(), CHECK_VALUE);
    }

    #[test]
    fn value_does_not_consume() {
        let mut crc = Crc32::new();
        crc.update(&CHECK_INPUT[..4]);
        let _ = crc.value();
        crc.update(&CHECK_INPUT[4..]);
        assert_eq!(crc.value(), CHECK_VALUE);
    }

    #[tokio::test]
    async fn reader_unbounded() {
        let actual = of_reader(CHECK_INPUT, None).await.unwrap();
        assert_eq!(actual, CHECK_VALUE);
    }

    #[tokio::test]
    async fn reader_bounded() {
        let input: &[u8] = b"123456789tail-beyond-the-limit";
        let actual = of_reader(input, Some(CHECK_INPUT.len() as u64))
            .await
            .unwrap();
        assert_eq!(actual, CHECK_VALUE);
    }
}
