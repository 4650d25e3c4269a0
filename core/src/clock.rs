//! Clock readings and transaction identifiers
//!
//! Transaction ids double as lock tokens: a token is stale once the clock has
//! moved more than the lock timeout past the id it carries.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of nanosecond clock readings.
pub trait Clock: Send + Sync {
    fn now_nanos(&self) -> u64;
}

/// Wall clock, nanoseconds since the UNIX epoch.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_nanos(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0)
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start: u64) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    pub fn set(&self, nanos: u64) {
        self.now.store(nanos, Ordering::SeqCst);
    }

    pub fn advance(&self, nanos: u64) {
        self.now.fetch_add(nanos, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_nanos(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Transaction identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TxnId(pub u64);

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TxnId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(TxnId)
    }
}

/// Issues transaction ids from clock readings.
///
/// Two ids requested within one clock tick would collide, so every id is at
/// least one more than the previous one handed out by this generator.
pub struct IdGenerator {
    clock: Arc<dyn Clock>,
    last: AtomicU64,
}

impl IdGenerator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            last: AtomicU64::new(0),
        }
    }

    pub fn next_id(&self) -> TxnId {
        let now = self.clock.now_nanos();
        let mut prev = self.last.load(Ordering::SeqCst);
        loop {
            let candidate = now.max(prev + 1);
            match self
                .last
                .compare_exchange(prev, candidate, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return TxnId(candidate),
                Err(actual) => prev = actual,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_unique_within_one_tick() {
        let clock = Arc::new(ManualClock::new(1_000));
        let ids = IdGenerator::new(clock.clone());

        let a = ids.next_id();
        let b = ids.next_id();
        let c = ids.next_id();
        assert_eq!(a, TxnId(1_000));
        assert!(a < b && b < c);

        clock.set(5_000);
        assert_eq!(ids.next_id(), TxnId(5_000));
    }

    #[test]
    fn test_txn_id_text_form() {
        let id = TxnId(1_318_000_000_123);
        assert_eq!(id.to_string(), "1318000000123");
        assert_eq!("1318000000123".parse::<TxnId>().unwrap(), id);
        assert!("abc".parse::<TxnId>().is_err());
    }
}
