//! Watch countdown
//!
//! Remaining time is a pure function of stored timestamps, so the bot reply,
//! the Mini App page and a restarted process all derive the same value.

/// Seconds left before a claim is allowed
pub fn remaining_secs(now: u64, origin: u64, required_seconds: u32) -> u64 {
    origin
        .saturating_add(u64::from(required_seconds))
        .saturating_sub(now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remaining_secs() {
        assert_eq!(remaining_secs(100, 100, 15), 15);
        assert_eq!(remaining_secs(110, 100, 15), 5);
        assert_eq!(remaining_secs(115, 100, 15), 0);
        assert_eq!(remaining_secs(500, 100, 15), 0);
        // Clock behind the origin never underflows
        assert_eq!(remaining_secs(90, 100, 15), 25);
    }
}
