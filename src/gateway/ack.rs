//! Acknowledgment builder: turns a genuine uplink into the fixed "OK"
//! downlink, mirroring the uplink's radio parameters so the end-device
//! keeps listening on the channel it used.

use crate::gateway::conf::Tunables;
use crate::hal::{Modulation, RxPacket, TxMode, TxPacket};

/* the gateway answers every genuine uplink with this fixed payload */
pub const ACK_PAYLOAD: [u8; 2] = *b"OK";

/* index of the single TX-capable RF chain; configuration constant, there
   is no runtime arbitration between chains */
pub const TX_RF_CHAIN: u8 = 0;

/// Build the acknowledgment for `rx`. Frequency, bandwidth, datarate and
/// coderate are copied verbatim from the uplink; power, polarity and
/// preamble come from static configuration. The transmission is scheduled
/// at `rx.count_us + ack_wait_offset_us` on the wrapping counter.
///
/// Construction cannot fail; submission errors are the caller's business.
pub fn build(rx: &RxPacket, tun: &Tunables) -> TxPacket {
    let mut pkt = TxPacket {
        freq_hz: rx.freq_hz,
        tx_mode: TxMode::Timestamped,
        count_us: rx.count_us.wrapping_add(tun.echo.ack_wait_offset_us),
        rf_chain: TX_RF_CHAIN,
        rf_power: tun.tx_power_dbm,
        modulation: Modulation::Lora,
        bandwidth: rx.bandwidth,
        datarate: rx.datarate,
        coderate: rx.coderate,
        invert_pol: tun.invert_polarity,
        preamble: tun.preamble,
        no_crc: false,
        size: ACK_PAYLOAD.len() as u16,
        ..Default::default()
    };
    pkt.payload[..ACK_PAYLOAD.len()].copy_from_slice(&ACK_PAYLOAD);
    pkt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::sim::SimConcentrator;
    use crate::hal::{BW_500KHZ, CR_LORA_4_8, DR_LORA_SF9, STAT_CRC_OK};

    #[test]
    fn radio_parameters_are_mirrored_verbatim() {
        let mut rx = SimConcentrator::make_uplink(917_500_000, DR_LORA_SF9, 1_234_567);
        rx.bandwidth = BW_500KHZ;
        rx.coderate = CR_LORA_4_8;
        rx.status = STAT_CRC_OK;

        let tun = Tunables::default();
        let tx = build(&rx, &tun);

        assert_eq!(tx.freq_hz, rx.freq_hz);
        assert_eq!(tx.bandwidth, rx.bandwidth);
        assert_eq!(tx.datarate, rx.datarate);
        assert_eq!(tx.coderate, rx.coderate);
        assert_eq!(tx.modulation, Modulation::Lora);
        assert_eq!(tx.tx_mode, TxMode::Timestamped);
        assert_eq!(tx.rf_chain, TX_RF_CHAIN);
    }

    #[test]
    fn scheduled_at_capture_plus_wait_offset() {
        let rx = SimConcentrator::make_uplink(917_000_000, DR_LORA_SF9, 900_000);
        let tun = Tunables::default();
        let tx = build(&rx, &tun);
        assert_eq!(tx.count_us, 1_400_000);
    }

    #[test]
    fn scheduling_wraps_with_the_counter() {
        let rx = SimConcentrator::make_uplink(917_000_000, DR_LORA_SF9, u32::MAX - 100);
        let tun = Tunables::default();
        let tx = build(&rx, &tun);
        assert_eq!(
            tx.count_us,
            (u32::MAX - 100).wrapping_add(tun.echo.ack_wait_offset_us)
        );
    }

    #[test]
    fn fixed_two_byte_payload() {
        let rx = SimConcentrator::make_uplink(917_000_000, DR_LORA_SF9, 0);
        let tx = build(&rx, &Tunables::default());
        assert_eq!(tx.size, 2);
        assert_eq!(&tx.payload[..2], b"OK");
        assert!(!tx.no_crc);
    }
}
