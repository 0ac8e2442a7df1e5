//! TIME protocol (RFC 868) wire codec.
//!
//! A response is exactly four bytes: an unsigned big-endian count of seconds
//! since 1900-01-01T00:00:00Z. There is no other framing; the server closes
//! the connection once the bytes are written.

use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds between 1900-01-01T00:00:00Z and the Unix epoch.
pub const EPOCH_OFFSET: i64 = 2_208_988_800;

/// Length of a TIME response on the wire.
pub const FRAME_LEN: usize = 4;

/// Encodes milliseconds since the Unix epoch as a TIME response.
///
/// Sub-second precision is truncated towards negative infinity. Values past
/// 2036-02-07 wrap modulo 2^32, as the protocol's 32-bit field does.
pub fn encode_millis(unix_millis: i64) -> [u8; FRAME_LEN] {
    let seconds = unix_millis.div_euclid(1000) + EPOCH_OFFSET;
    (seconds as u32).to_be_bytes()
}

/// Encodes a [`SystemTime`] as a TIME response.
pub fn encode_system_time(time: SystemTime) -> [u8; FRAME_LEN] {
    encode_millis(system_time_to_millis(time))
}

/// Decodes a TIME response into milliseconds since the Unix epoch.
pub fn decode_millis(frame: [u8; FRAME_LEN]) -> i64 {
    (i64::from(u32::from_be_bytes(frame)) - EPOCH_OFFSET) * 1000
}

/// Converts a [`SystemTime`] into signed milliseconds since the Unix epoch.
pub fn system_time_to_millis(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => after.as_millis() as i64,
        Err(before) => {
            let before = before.duration();
            -(before.as_millis() as i64) - i64::from(before.subsec_nanos() % 1_000_000 != 0)
        }
    }
}

/// Incremental decoder for a single TIME response.
///
/// Bytes may arrive in arbitrarily small pieces; the decoder buffers them
/// until a whole frame is available. Anything after the first frame is
/// ignored.
#[derive(Debug, Default)]
pub struct TimeDecoder {
    buffer: [u8; FRAME_LEN],
    filled: usize,
}

impl TimeDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds `data` and returns the decoded value once four bytes are in.
    ///
    /// Returns `None` while the frame is incomplete, and `None` again for
    /// every call after the frame has already been produced.
    pub fn feed(&mut self, data: &[u8]) -> Option<i64> {
        if self.filled == FRAME_LEN {
            return None;
        }

        let take = data.len().min(FRAME_LEN - self.filled);
        self.buffer[self.filled..self.filled + take].copy_from_slice(&data[..take]);
        self.filled += take;

        (self.filled == FRAME_LEN).then(|| decode_millis(self.buffer))
    }

    /// Number of bytes buffered so far (at most four).
    pub fn received(&self) -> usize {
        self.filled
    }

    pub fn is_done(&self) -> bool {
        self.filled == FRAME_LEN
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    #[test]
    fn test_decode_zero_is_1900() {
        assert_eq!(decode_millis([0, 0, 0, 0]), -2_208_988_800_000);
    }

    #[test]
    fn test_encode_unix_epoch() {
        assert_eq!(encode_millis(0), [0x83, 0xAA, 0x7E, 0x80]);
    }

    #[test]
    fn test_encode_truncates_sub_second() {
        assert_eq!(encode_millis(999), encode_millis(0));
        assert_eq!(decode_millis(encode_millis(1_700_000_000_999)), 1_700_000_000_000);
    }

    #[test]
    fn test_encode_before_unix_epoch() {
        // 1969-12-31T23:59:59.500Z truncates down to 23:59:59.
        assert_eq!(decode_millis(encode_millis(-500)), -1000);
    }

    #[test]
    fn test_encode_wraps_after_2036() {
        let rollover = (u32::MAX as i64 + 1 - EPOCH_OFFSET) * 1000;
        assert_eq!(encode_millis(rollover), [0, 0, 0, 0]);
    }

    #[test]
    fn test_encode_system_time() {
        let time = UNIX_EPOCH + Duration::from_secs(1_000_000_000);
        let frame = encode_system_time(time);
        assert_eq!(decode_millis(frame), 1_000_000_000_000);
    }

    #[test]
    fn test_system_time_before_epoch() {
        let time = UNIX_EPOCH - Duration::from_millis(1500);
        assert_eq!(system_time_to_millis(time), -1500);

        let time = UNIX_EPOCH - Duration::from_micros(1500);
        assert_eq!(system_time_to_millis(time), -2);
    }

    #[test]
    fn test_decoder_buffers_partial_reads() {
        let mut decoder = TimeDecoder::new();
        let frame = encode_millis(0);

        assert_eq!(decoder.feed(&frame[..1]), None);
        assert_eq!(decoder.feed(&frame[1..3]), None);
        assert_eq!(decoder.received(), 3);
        assert_eq!(decoder.feed(&frame[3..]), Some(0));
        assert!(decoder.is_done());
    }

    #[test]
    fn test_decoder_ignores_trailing_bytes() {
        let mut decoder = TimeDecoder::new();

        assert_eq!(decoder.feed(&[0x83, 0xAA, 0x7E, 0x80, 0xFF, 0xFF]), Some(0));
        assert_eq!(decoder.feed(&[0, 0, 0, 0]), None);
    }

    #[test]
    fn test_decoder_empty_feed() {
        let mut decoder = TimeDecoder::new();

        assert_eq!(decoder.feed(&[]), None);
        assert_eq!(decoder.received(), 0);
    }
}
