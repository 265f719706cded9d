//! Self-reflection filter. The concentrator hears the gateway's own
//! transmissions; this module decides whether a fresh reception is such an
//! echo or a genuine uplink that deserves an acknowledgment.
//!
//! All timestamp arithmetic is done with `u32::wrapping_sub` on the raw
//! microsecond counter, so every comparison stays valid across counter
//! rollover. That is the one convention used everywhere in this crate.

use serde::{Deserialize, Serialize};

/* Delay at which the gateway re-receives its own earlier transmission.
   Empirically tuned on the RAK2247 board, no derivation known. */
pub const TX_ECHO_DELTA_US: u32 = 57_840;

/* Default delay between a reception and its scheduled acknowledgment */
pub const ACK_WAIT_OFFSET_US: u32 = 500_000;

/* Half-width of the round-trip window around the ack wait offset */
pub const ACK_ECHO_WINDOW_US: u32 = 500;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EchoParams {
    /// Echo delta of a re-received own transmission, in microseconds.
    #[serde(default = "default_tx_echo_delta")]
    pub tx_echo_delta_us: u32,
    /// Offset between a reception and its scheduled acknowledgment.
    #[serde(default = "default_ack_wait_offset")]
    pub ack_wait_offset_us: u32,
    /// Half-width of the ack round-trip window.
    #[serde(default = "default_ack_echo_window")]
    pub ack_echo_window_us: u32,
}

fn default_tx_echo_delta() -> u32 {
    TX_ECHO_DELTA_US
}

fn default_ack_wait_offset() -> u32 {
    ACK_WAIT_OFFSET_US
}

fn default_ack_echo_window() -> u32 {
    ACK_ECHO_WINDOW_US
}

impl Default for EchoParams {
    fn default() -> Self {
        Self {
            tx_echo_delta_us: TX_ECHO_DELTA_US,
            ack_wait_offset_us: ACK_WAIT_OFFSET_US,
            ack_echo_window_us: ACK_ECHO_WINDOW_US,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    /// Externally originated frame, proceed to acknowledgment.
    Genuine,
    /// Reception at the fixed echo delta of the previous transmission.
    TxEcho,
    /// Capture timestamp identical to the last scheduled transmission.
    Coincident,
    /// Reception inside the round-trip window of a previous acknowledgment.
    AckRoundTrip,
}

impl Verdict {
    pub fn is_reflection(&self) -> bool {
        !matches!(self, Verdict::Genuine)
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Genuine => write!(f, "genuine"),
            Verdict::TxEcho => write!(f, "tx-echo"),
            Verdict::Coincident => write!(f, "coincident"),
            Verdict::AckRoundTrip => write!(f, "ack-round-trip"),
        }
    }
}

/// Classify a reception at counter value `rx_us` against the last scheduled
/// transmission `last_tx_us`. Pure: reads nothing but its arguments.
///
/// The round-trip check uses open-interval semantics: a difference of
/// exactly `ack_wait_offset ± ack_echo_window` is genuine.
pub fn classify(last_tx_us: u32, rx_us: u32, params: &EchoParams) -> Verdict {
    if rx_us == last_tx_us {
        return Verdict::Coincident;
    }
    if rx_us.wrapping_sub(last_tx_us) == params.tx_echo_delta_us {
        return Verdict::TxEcho;
    }

    /* last_tx - rx strictly inside (offset - window, offset + window);
       shifting by the lower bound keeps the test correct under wrap */
    let back = last_tx_us.wrapping_sub(rx_us);
    let lower = params.ack_wait_offset_us.wrapping_sub(params.ack_echo_window_us);
    let shifted = back.wrapping_sub(lower);
    if shifted > 0 && shifted < 2 * params.ack_echo_window_us {
        return Verdict::AckRoundTrip;
    }

    Verdict::Genuine
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> EchoParams {
        EchoParams::default()
    }

    #[test]
    fn tx_echo_delta_is_reflection() {
        let p = defaults();
        assert_eq!(classify(1_000_000, 1_057_840, &p), Verdict::TxEcho);
        assert_eq!(classify(0, TX_ECHO_DELTA_US, &p), Verdict::TxEcho);
    }

    #[test]
    fn tx_echo_delta_across_wraparound() {
        let p = defaults();
        let last_tx = u32::MAX - 10_000;
        let rx = last_tx.wrapping_add(TX_ECHO_DELTA_US);
        assert_eq!(classify(last_tx, rx, &p), Verdict::TxEcho);
    }

    #[test]
    fn coincident_timestamp_is_reflection() {
        let p = defaults();
        assert_eq!(classify(1_000_000, 1_000_000, &p), Verdict::Coincident);
        assert_eq!(classify(0, 0, &p), Verdict::Coincident);
    }

    #[test]
    fn ack_round_trip_window_is_open() {
        let p = defaults();
        let last_tx = 2_000_000u32;

        /* strictly inside the window: reflection */
        let rx = last_tx - ACK_WAIT_OFFSET_US + 1;
        assert_eq!(classify(last_tx, rx, &p), Verdict::AckRoundTrip);
        let rx = last_tx - ACK_WAIT_OFFSET_US - 499;
        assert_eq!(classify(last_tx, rx, &p), Verdict::AckRoundTrip);
        let rx = last_tx - ACK_WAIT_OFFSET_US + 499;
        assert_eq!(classify(last_tx, rx, &p), Verdict::AckRoundTrip);

        /* exactly on a boundary: genuine */
        let rx = last_tx - (ACK_WAIT_OFFSET_US - ACK_ECHO_WINDOW_US);
        assert_eq!(classify(last_tx, rx, &p), Verdict::Genuine);
        let rx = last_tx - (ACK_WAIT_OFFSET_US + ACK_ECHO_WINDOW_US);
        assert_eq!(classify(last_tx, rx, &p), Verdict::Genuine);
    }

    #[test]
    fn ack_round_trip_window_across_wraparound() {
        let p = defaults();
        let last_tx = 100_000u32; /* reception happened before the counter wrapped */
        let rx = last_tx.wrapping_sub(ACK_WAIT_OFFSET_US);
        assert_eq!(classify(last_tx, rx.wrapping_add(1), &p), Verdict::AckRoundTrip);
        assert_eq!(
            classify(last_tx, rx.wrapping_sub(ACK_ECHO_WINDOW_US), &p),
            Verdict::Genuine
        );
    }

    #[test]
    fn outside_all_windows_is_genuine() {
        let p = defaults();
        /* lastTx - t = 100_000, well outside the 500 ms round-trip window */
        assert_eq!(classify(1_000_000, 900_000, &p), Verdict::Genuine);
        assert_eq!(classify(1_000_000, 5_000_000, &p), Verdict::Genuine);
        assert_eq!(classify(0, 1, &p), Verdict::Genuine);
    }

    #[test]
    fn overridden_parameters_are_honored() {
        let p = EchoParams {
            tx_echo_delta_us: 10,
            ack_wait_offset_us: 1_000,
            ack_echo_window_us: 100,
        };
        assert_eq!(classify(500, 510, &p), Verdict::TxEcho);
        assert_eq!(classify(1_500, 550, &p), Verdict::AckRoundTrip);
        assert_eq!(classify(1_500, 400, &p), Verdict::Genuine); /* exactly offset+window */
        assert_eq!(classify(1_000_000, 1_057_840, &p), Verdict::Genuine);
    }
}
