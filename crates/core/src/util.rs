use std::time::{SystemTime, UNIX_EPOCH};

/// Returns current unix epoch seconds.
///
/// A clock set before the epoch reads as 0.
pub(crate) fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// Last `max` bytes of `bytes` as lossy UTF-8, for log lines.
pub(crate) fn tail_lossy(bytes: &[u8], max: usize) -> String {
    let start = bytes.len().saturating_sub(max);
    String::from_utf8_lossy(&bytes[start..]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_unix_is_after_2020() {
        assert!(now_unix() > 1_577_836_800);
    }

    #[test]
    fn tail_keeps_last_bytes() {
        assert_eq!(tail_lossy(b"abcdef", 3), "def");
        assert_eq!(tail_lossy(b"ab", 10), "ab");
        assert_eq!(tail_lossy(b"", 10), "");
    }
}
