//! Delays between sends and between batches.

use std::time::Duration;

/// Campaign pacing: how long to wait between consecutive sends and between
/// consecutive batches. The inter-batch pause replaces, not stacks on, the
/// inter-email pause at a batch boundary, and no pause follows the final
/// contact.
#[derive(Clone, Copy, Debug)]
pub struct Pacing {
    pub inter_email: Duration,
    pub inter_batch: Duration,
}

impl Pacing {
    #[must_use]
    pub const fn new(inter_email: Duration, inter_batch: Duration) -> Self {
        Self {
            inter_email,
            inter_batch,
        }
    }

    #[must_use]
    pub const fn from_secs(inter_email_secs: u64, inter_batch_secs: u64) -> Self {
        Self::new(
            Duration::from_secs(inter_email_secs),
            Duration::from_secs(inter_batch_secs),
        )
    }

    /// The pause after sending contact `index` out of `total`, given the
    /// batch size. `None` after the final contact.
    #[must_use]
    pub const fn pause_after(&self, index: usize, total: usize, batch_size: usize) -> Option<Duration> {
        if index + 1 >= total {
            return None;
        }
        if batch_size > 0 && (index + 1) % batch_size == 0 {
            Some(self.inter_batch)
        } else {
            Some(self.inter_email)
        }
    }
}
