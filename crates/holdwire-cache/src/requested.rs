#![forbid(unsafe_code)]

use web_time::{Duration, Instant};

/// A fetched value paired with the instant after which it must be refetched.
///
/// An entry without an expiry instant stays fresh forever.
#[derive(Debug, Clone, PartialEq)]
pub struct Requested<T> {
    value: T,
    expires_at: Option<Instant>,
}

impl<T> Requested<T> {
    #[must_use]
    pub fn new(value: T, expires_at: Instant) -> Self {
        Self {
            value,
            expires_at: Some(expires_at),
        }
    }

    /// A value that never goes stale.
    #[must_use]
    pub fn never_expiring(value: T) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    /// A value that stays fresh for `ttl` after `now`. A `ttl` past the end
    /// of the representable timeline never expires.
    #[must_use]
    pub fn expiring_in(value: T, now: Instant, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: now.checked_add(ttl),
        }
    }

    #[must_use]
    pub fn value(&self) -> &T {
        &self.value
    }

    #[must_use]
    pub fn into_value(self) -> T {
        self.value
    }

    /// `None` for a value that never expires.
    #[must_use]
    pub fn expires_at(&self) -> Option<Instant> {
        self.expires_at
    }

    /// Fresh strictly before the expiry instant; stale at and after it.
    #[must_use]
    pub fn is_fresh_at(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|expires_at| now < expires_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_boundary_is_stale() {
        let now = Instant::now();
        let entry = Requested::expiring_in("v", now, Duration::from_secs(10));
        assert!(entry.is_fresh_at(now));
        assert!(entry.is_fresh_at(now + Duration::from_secs(9)));
        assert!(!entry.is_fresh_at(now + Duration::from_secs(10)));
        assert!(!entry.is_fresh_at(now + Duration::from_secs(11)));
        assert_eq!(*entry.value(), "v");
        assert_eq!(entry.expires_at(), Some(now + Duration::from_secs(10)));
    }

    #[test]
    fn zero_ttl_is_never_fresh() {
        let now = Instant::now();
        let entry = Requested::expiring_in(1u8, now, Duration::ZERO);
        assert!(!entry.is_fresh_at(now));
        assert_eq!(entry.into_value(), 1);
    }

    #[test]
    fn unbounded_ttl_never_expires() {
        let now = Instant::now();
        let entry = Requested::expiring_in(7u32, now, Duration::MAX);
        assert_eq!(entry.expires_at(), None);
        assert!(entry.is_fresh_at(now));
        assert!(entry.is_fresh_at(now + Duration::from_secs(86_400 * 365 * 100)));
        assert_eq!(entry, Requested::never_expiring(7));
    }
}
