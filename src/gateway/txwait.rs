//! Bounded wait for the TX modem to come back to `Free` after a send has
//! been scheduled. The underlying interface is poll-based, so this is an
//! explicit fixed-period poll with an attempt bound instead of a blocking
//! primitive.

use std::thread;
use std::time::Duration;

use anyhow::Result;
use tracing::{trace, warn};

use crate::hal::Concentrator;

/// Poll `tx_status` on `rf_chain` every `period` until the modem reports
/// free, at most `attempts` times. Returns whether the modem freed; running
/// out of attempts is a non-fatal timeout reported as `Ok(false)`.
///
/// A status query failing at the COM level is a hardware error and is
/// propagated to the caller.
pub fn wait_tx_free(
    hal: &mut dyn Concentrator,
    rf_chain: u8,
    period: Duration,
    attempts: u32,
) -> Result<bool> {
    for attempt in 0..attempts {
        let status = hal.tx_status(rf_chain)?;
        if status.is_free() {
            trace!(attempt, "TX modem free");
            return Ok(true);
        }
        thread::sleep(period);
    }
    warn!(
        attempts,
        period_ms = period.as_millis() as u64,
        "timed out waiting for TX modem to free, dropping the wait"
    );
    Ok(false)
}
