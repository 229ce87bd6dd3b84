// Time source used for timestamps and due-date classification

use chrono::{DateTime, FixedOffset, Local, Offset, TimeZone, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

/// Something that can tell the current time
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;

    /// Offset that decides where calendar days start for due dates
    fn offset(&self) -> FixedOffset {
        Utc.fix()
    }

    /// `now` as seen on the user's calendar
    fn local_now(&self) -> DateTime<FixedOffset> {
        self.now().with_timezone(&self.offset())
    }
}

/// Wall-clock time in the host's timezone
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn offset(&self) -> FixedOffset {
        Local::now().offset().fix()
    }
}

/// A clock that only moves when told to
///
/// Clones share the same instant, so a test can keep one handle and hand the
/// other to a store. Days start at UTC midnight unless an offset is given.
#[derive(Debug, Clone)]
pub struct ManualClock {
    millis: Arc<AtomicI64>,
    offset: FixedOffset,
}

impl ManualClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            millis: Arc::new(AtomicI64::new(at.timestamp_millis())),
            offset: Utc.fix(),
        }
    }

    pub fn with_offset(mut self, offset: FixedOffset) -> Self {
        self.offset = offset;
        self
    }

    pub fn set(&self, at: DateTime<Utc>) {
        self.millis.store(at.timestamp_millis(), Ordering::SeqCst);
    }

    pub fn advance(&self, by: chrono::Duration) {
        self.millis.fetch_add(by.num_milliseconds(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let ms = self.millis.load(Ordering::SeqCst);
        Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
    }

    fn offset(&self) -> FixedOffset {
        self.offset
    }
}

impl<C: Clock + ?Sized> Clock for Box<C> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }

    fn offset(&self) -> FixedOffset {
        (**self).offset()
    }
}
