//! Software concentrator for desk testing. Keeps its own wrapping
//! microsecond counter, replays scripted receptions and records every
//! scheduled transmission, so the control loop can run without a board
//! attached.

use std::collections::VecDeque;

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, trace};

use super::error::Error;
use super::{
    BoardConf, Concentrator, Modulation, RadioType, RxIfConf, RxPacket, RxRfConf, TxGain,
    TxPacket, TxStatus, CR_LORA_4_5, BW_125KHZ, DR_LORA_SF12, DR_LORA_SF7, LGW_RF_CHAIN_NB,
    STAT_CRC_BAD, STAT_CRC_OK,
};

/* how long the TX modem stays busy after a scheduled send; rough airtime
   of a short LoRa packet, good enough for the bench */
const SIM_TX_BUSY_US: u32 = 60_000;

/* channel frequencies used by the synthetic traffic generator */
const SIM_TRAFFIC_FREQS: [u32; 8] = [
    916_800_000,
    917_000_000,
    917_200_000,
    917_400_000,
    917_600_000,
    917_800_000,
    918_000_000,
    918_200_000,
];

pub struct SimConcentrator {
    started: bool,
    clock_us: u32,                     /* wraps at u32 width like the hardware counter */
    tick_us: u32,                      /* counter advance per receive poll */
    status_tick_us: u32,               /* counter advance per tx_status query */
    tx_enable: [bool; LGW_RF_CHAIN_NB as usize],
    queue: VecDeque<(u32, RxPacket)>,  /* (due timestamp, packet) */
    sent: Vec<TxPacket>,
    tx_end_us: u32,                    /* TX modem busy until this counter value */
    tx_stuck: bool,                    /* fault injection: TX never reports free */
    fail_receive: bool,                /* fault injection: receive reports a hardware error */
    fail_send: bool,                   /* fault injection: send reports a hardware error */
    echo_back: bool,                   /* re-inject sent packets as self-receptions */
    traffic_every: Option<u32>,        /* synthesize one uplink every N polls */
    polls: u32,
    rng: StdRng,
}

impl SimConcentrator {
    pub fn new(seed: u64) -> Self {
        Self {
            started: false,
            clock_us: 0,
            tick_us: 3_000,
            status_tick_us: 5_000,
            tx_enable: [false; LGW_RF_CHAIN_NB as usize],
            queue: VecDeque::new(),
            sent: Vec::new(),
            tx_end_us: 0,
            tx_stuck: false,
            fail_receive: false,
            fail_send: false,
            echo_back: false,
            traffic_every: None,
            polls: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Synthesize a random uplink every `every` receive polls.
    pub fn with_traffic(mut self, every: u32) -> Self {
        self.traffic_every = Some(every.max(1));
        self
    }

    /// Re-inject every scheduled transmission as a reception at its own
    /// transmit timestamp, the way the gateway hears itself on air.
    pub fn with_echo_back(mut self) -> Self {
        self.echo_back = true;
        self
    }

    pub fn now_us(&self) -> u32 {
        self.clock_us
    }

    pub fn sent(&self) -> &[TxPacket] {
        &self.sent
    }

    /// Script a reception to be delivered once the counter reaches `due_us`.
    pub fn push_rx(&mut self, due_us: u32, pkt: RxPacket) {
        self.queue.push_back((due_us, pkt));
    }

    pub fn fail_next_receive(&mut self) {
        self.fail_receive = true;
    }

    pub fn fail_next_send(&mut self) {
        self.fail_send = true;
    }

    pub fn stick_tx(&mut self) {
        self.tx_stuck = true;
    }

    /// Convenience constructor for a valid-CRC LoRa uplink.
    pub fn make_uplink(freq_hz: u32, datarate: u32, count_us: u32) -> RxPacket {
        let mut pkt = RxPacket::new();
        pkt.freq_hz = freq_hz;
        pkt.status = STAT_CRC_OK;
        pkt.count_us = count_us;
        pkt.modulation = Modulation::Lora;
        pkt.bandwidth = BW_125KHZ;
        pkt.datarate = datarate;
        pkt.coderate = CR_LORA_4_5;
        pkt.rssi = -80.0;
        pkt.snr = 7.5;
        pkt.size = 4;
        pkt.payload[..4].copy_from_slice(b"PING");
        pkt
    }

    fn synthesize_uplink(&mut self) -> RxPacket {
        let freq = SIM_TRAFFIC_FREQS[self.rng.random_range(0..SIM_TRAFFIC_FREQS.len())];
        let sf = self.rng.random_range(DR_LORA_SF7..=DR_LORA_SF12);
        let mut pkt = Self::make_uplink(freq, sf, self.clock_us);
        pkt.rssi = -120.0 + self.rng.random_range(0.0..40.0f32);
        pkt.snr = -5.0 + self.rng.random_range(0.0..15.0f32);
        if self.rng.random_bool(0.1) {
            pkt.status = STAT_CRC_BAD;
        }
        pkt
    }

    /* wrapping "a >= b" on the microsecond counter */
    fn reached(now: u32, due: u32) -> bool {
        now.wrapping_sub(due) < u32::MAX / 2
    }
}

impl Concentrator for SimConcentrator {
    fn board_setconf(&mut self, conf: &BoardConf) -> Result<()> {
        if self.started {
            return Err(Error::Conf.into());
        }
        trace!(clksrc = conf.clksrc, public = conf.lorawan_public, "sim: board conf");
        Ok(())
    }

    fn rxrf_setconf(&mut self, rf_chain: u8, conf: &RxRfConf) -> Result<()> {
        if self.started || rf_chain >= LGW_RF_CHAIN_NB {
            return Err(Error::Conf.into());
        }
        if conf.enable && conf._type == RadioType::None {
            return Err(Error::Conf.into());
        }
        self.tx_enable[rf_chain as usize] = conf.enable && conf.tx_enable;
        trace!(rf_chain, freq = conf.freq_hz, tx = conf.tx_enable, "sim: rf conf");
        Ok(())
    }

    fn rxif_setconf(&mut self, if_chain: u8, conf: &RxIfConf) -> Result<()> {
        if self.started {
            return Err(Error::Conf.into());
        }
        trace!(if_chain, radio = conf.rf_chain, offset = conf.freq_hz, "sim: if conf");
        Ok(())
    }

    fn txgain_setconf(&mut self, rf_chain: u8, lut: &[TxGain]) -> Result<()> {
        if self.started || rf_chain >= LGW_RF_CHAIN_NB || lut.is_empty() {
            return Err(Error::Conf.into());
        }
        trace!(rf_chain, entries = lut.len(), "sim: tx gain conf");
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        if self.started {
            return Ok(());
        }
        self.started = true;
        debug!("sim: concentrator started");
        Ok(())
    }

    fn receive(&mut self, max_pkt: usize) -> Result<Vec<RxPacket>> {
        if self.fail_receive {
            self.fail_receive = false;
            return Err(Error::Receive.into());
        }
        if !self.started {
            return Err(Error::Hal.into());
        }

        self.clock_us = self.clock_us.wrapping_add(self.tick_us);
        self.polls += 1;

        if let Some(every) = self.traffic_every {
            if self.polls % every == 0 {
                let pkt = self.synthesize_uplink();
                self.queue.push_back((pkt.count_us, pkt));
            }
        }

        let mut pkts = Vec::new();
        while pkts.len() < max_pkt {
            let due = match self.queue.front() {
                Some((due, _)) => *due,
                None => break,
            };
            if !Self::reached(self.clock_us, due) {
                break;
            }
            if let Some((_, pkt)) = self.queue.pop_front() {
                pkts.push(pkt);
            }
        }
        Ok(pkts)
    }

    fn send(&mut self, pkt: &TxPacket) -> Result<()> {
        if self.fail_send {
            self.fail_send = false;
            return Err(Error::Send.into());
        }
        if !self.started {
            return Err(Error::Hal.into());
        }
        if pkt.rf_chain >= LGW_RF_CHAIN_NB || !self.tx_enable[pkt.rf_chain as usize] {
            return Err(Error::Send.into());
        }
        if pkt.modulation != Modulation::Lora || pkt.size as usize > 255 {
            return Err(Error::Send.into());
        }

        self.tx_end_us = pkt.count_us.wrapping_add(SIM_TX_BUSY_US);
        if self.echo_back {
            let mut echo = RxPacket::new();
            echo.freq_hz = pkt.freq_hz;
            echo.status = STAT_CRC_OK;
            echo.count_us = pkt.count_us;
            echo.modulation = pkt.modulation;
            echo.bandwidth = pkt.bandwidth;
            echo.datarate = pkt.datarate;
            echo.coderate = pkt.coderate;
            echo.rssi = -20.0;
            echo.snr = 12.0;
            echo.size = pkt.size;
            echo.payload = pkt.payload;
            self.queue.push_back((pkt.count_us, echo));
        }
        self.sent.push(*pkt);
        Ok(())
    }

    fn tx_status(&mut self, rf_chain: u8) -> Result<TxStatus> {
        if !self.started {
            return Err(Error::Hal.into());
        }
        if rf_chain >= LGW_RF_CHAIN_NB {
            return Err(Error::Hal.into());
        }
        if self.tx_stuck {
            return Ok(TxStatus::Emitting);
        }
        /* a status query costs real time on the COM link */
        self.clock_us = self.clock_us.wrapping_add(self.status_tick_us);
        if Self::reached(self.clock_us, self.tx_end_us) {
            Ok(TxStatus::Free)
        } else {
            Ok(TxStatus::Scheduled)
        }
    }
}
