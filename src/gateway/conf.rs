//! Static gateway configuration: the channel plan, the TX gain table, the
//! gateway identifier and the control-loop tunables. Everything can be
//! loaded from a JSON file; the compiled-in defaults reproduce the
//! 916.8-918.2 MHz plan of the reference board.

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::gateway::echo::EchoParams;
use crate::hal::{
    BoardConf, Concentrator, RadioType, RxIfConf, RxRfConf, TxGain, BW_500KHZ, DR_LORA_SF7,
    LGW_MULTI_NB,
};

/// Control-loop tunables, all overridable from the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tunables {
    #[serde(default)]
    pub echo: EchoParams,
    /// TX power of the acknowledgment, in dBm. Must exist in the gain LUT.
    #[serde(default = "default_tx_power")]
    pub tx_power_dbm: i8,
    /// Polarity inversion flag of the acknowledgment.
    #[serde(default)]
    pub invert_polarity: bool,
    /// Preamble length of the acknowledgment, in symbols.
    #[serde(default = "default_preamble")]
    pub preamble: u16,
    /// Period of the TX completion poll, in milliseconds.
    #[serde(default = "default_tx_poll_period_ms")]
    pub tx_poll_period_ms: u64,
    /// Attempt bound of the TX completion poll.
    #[serde(default = "default_tx_poll_attempts")]
    pub tx_poll_attempts: u32,
    /// Upper bound on packets fetched per receive poll.
    #[serde(default = "default_rx_poll_max")]
    pub rx_poll_max: usize,
    /// Sleep between two receive polls when the FIFO was empty, in ms.
    #[serde(default = "default_idle_sleep_ms")]
    pub idle_sleep_ms: u64,
}

fn default_tx_power() -> i8 {
    14
}

fn default_preamble() -> u16 {
    8
}

fn default_tx_poll_period_ms() -> u64 {
    5
}

fn default_tx_poll_attempts() -> u32 {
    1000
}

fn default_rx_poll_max() -> usize {
    16
}

fn default_idle_sleep_ms() -> u64 {
    3
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            echo: EchoParams::default(),
            tx_power_dbm: default_tx_power(),
            invert_polarity: false,
            preamble: default_preamble(),
            tx_poll_period_ms: default_tx_poll_period_ms(),
            tx_poll_attempts: default_tx_poll_attempts(),
            rx_poll_max: default_rx_poll_max(),
            idle_sleep_ms: default_idle_sleep_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConf {
    /// 64-bit gateway identifier, rendered once as 16 hex digits.
    #[serde(default = "default_gateway_id")]
    pub gateway_id: u64,
    #[serde(default)]
    pub board: BoardConf,
    #[serde(default = "default_rf_chains")]
    pub rf_chains: Vec<RxRfConf>,
    #[serde(default = "default_if_chains")]
    pub if_chains: Vec<RxIfConf>,
    #[serde(default = "default_tx_gain_lut")]
    pub tx_gain_lut: Vec<TxGain>,
    #[serde(default)]
    pub tunables: Tunables,
    /// Optional serial device mirroring the diagnostic output.
    #[serde(default)]
    pub debug_serial: Option<String>,
}

fn default_gateway_id() -> u64 {
    0x00AA_5500_0000_0000
}

fn default_rf_chains() -> Vec<RxRfConf> {
    vec![
        /* radio_0, the only TX-capable chain */
        RxRfConf {
            enable: true,
            freq_hz: 917_200_000,
            rssi_offset: -159.0,
            _type: RadioType::Sx1257,
            tx_enable: true,
        },
        /* radio_1 */
        RxRfConf {
            enable: true,
            freq_hz: 917_900_000,
            rssi_offset: -159.0,
            _type: RadioType::Sx1257,
            tx_enable: false,
        },
    ]
}

fn default_if_chains() -> Vec<RxIfConf> {
    let multi = |rf_chain: u8, freq_hz: i32| RxIfConf {
        enable: true,
        rf_chain,
        freq_hz,
        ..Default::default()
    };
    vec![
        /* eight multi-SF channels: 916.8 to 918.2 MHz in 200 kHz steps */
        multi(0, -400_000),
        multi(0, -200_000),
        multi(0, 0),
        multi(0, 200_000),
        multi(1, -300_000),
        multi(1, -100_000),
        multi(1, 100_000),
        multi(1, 300_000),
        /* LoRa standard channel at 917.5 MHz, 500 kHz single SF */
        RxIfConf {
            enable: true,
            rf_chain: 0,
            freq_hz: 300_000,
            bandwidth: BW_500KHZ,
            datarate: DR_LORA_SF7,
        },
        /* FSK channel, unused on this gateway */
        RxIfConf {
            enable: false,
            ..Default::default()
        },
    ]
}

fn default_tx_gain_lut() -> Vec<TxGain> {
    let entry = |rf_power: i8, pa_gain: u8, dac_gain: u8, mix_gain: u8| TxGain {
        rf_power,
        dig_gain: 0,
        pa_gain,
        dac_gain,
        mix_gain,
    };
    vec![
        entry(0, 0, 3, 12),
        entry(10, 1, 3, 12),
        entry(14, 2, 3, 10),
        entry(20, 3, 3, 9),
        entry(27, 3, 3, 14),
    ]
}

impl Default for GatewayConf {
    fn default() -> Self {
        Self {
            gateway_id: default_gateway_id(),
            board: BoardConf::default(),
            rf_chains: default_rf_chains(),
            if_chains: default_if_chains(),
            tx_gain_lut: default_tx_gain_lut(),
            tunables: Tunables::default(),
            debug_serial: None,
        }
    }
}

impl GatewayConf {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("failed to open configuration file {}", path.display()))?;
        let conf: GatewayConf = serde_json::from_reader(file)
            .with_context(|| format!("failed to parse configuration file {}", path.display()))?;
        Ok(conf)
    }

    /// Render the 64-bit gateway identifier the way it is printed on the
    /// casing: 16 uppercase hex digits.
    pub fn gateway_id_string(&self) -> String {
        format!("{:016X}", self.gateway_id)
    }

    /// Submit the whole channel plan and gain table to the concentrator.
    /// Must run before `start()`; any rejection is a configuration failure.
    pub fn apply(&self, hal: &mut dyn Concentrator) -> Result<()> {
        hal.board_setconf(&self.board)
            .context("failed to configure board")?;

        for (i, rf) in self.rf_chains.iter().enumerate() {
            if rf.enable {
                info!(
                    radio = i,
                    _type = %rf._type,
                    freq = rf.freq_hz,
                    tx = rf.tx_enable,
                    "radio enabled"
                );
            } else {
                info!(radio = i, "radio disabled");
            }
            hal.rxrf_setconf(i as u8, rf)
                .with_context(|| format!("invalid configuration for radio {}", i))?;
        }

        for (i, ifc) in self.if_chains.iter().enumerate() {
            if ifc.enable {
                if i < LGW_MULTI_NB as usize {
                    info!(
                        channel = i,
                        radio = ifc.rf_chain,
                        offset = ifc.freq_hz,
                        "LoRa multi-SF channel enabled"
                    );
                } else {
                    info!(
                        channel = i,
                        radio = ifc.rf_chain,
                        offset = ifc.freq_hz,
                        bandwidth = ifc.bandwidth,
                        datarate = ifc.datarate,
                        "channel enabled"
                    );
                }
            } else {
                debug!(channel = i, "channel disabled");
            }
            hal.rxif_setconf(i as u8, ifc)
                .with_context(|| format!("invalid configuration for IF chain {}", i))?;
        }

        hal.txgain_setconf(crate::gateway::ack::TX_RF_CHAIN, &self.tx_gain_lut)
            .context("invalid TX gain LUT")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::ack::TX_RF_CHAIN;
    use crate::hal::sim::SimConcentrator;

    #[test]
    fn default_plan_shape() {
        let conf = GatewayConf::default();
        assert_eq!(conf.rf_chains.len(), 2);
        assert_eq!(conf.if_chains.len(), 10);
        assert_eq!(
            conf.if_chains.iter().filter(|c| c.enable).count(),
            9,
            "eight multi-SF channels plus the LoRa standard channel"
        );
        /* exactly one TX-capable chain, and it is the configured one */
        let tx_chains: Vec<usize> = conf
            .rf_chains
            .iter()
            .enumerate()
            .filter(|(_, c)| c.tx_enable)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(tx_chains, vec![TX_RF_CHAIN as usize]);
    }

    #[test]
    fn default_gain_lut_covers_reference_powers() {
        let lut = default_tx_gain_lut();
        let powers: Vec<i8> = lut.iter().map(|g| g.rf_power).collect();
        assert_eq!(powers, vec![0, 10, 14, 20, 27]);
        assert!(powers.contains(&Tunables::default().tx_power_dbm));
    }

    #[test]
    fn gateway_id_renders_fixed_width_hex() {
        let mut conf = GatewayConf::default();
        conf.gateway_id = 0xAA555A0000000101;
        assert_eq!(conf.gateway_id_string(), "AA555A0000000101");
        conf.gateway_id = 0x1;
        assert_eq!(conf.gateway_id_string(), "0000000000000001");
    }

    #[test]
    fn apply_submits_whole_plan() {
        let conf = GatewayConf::default();
        let mut sim = SimConcentrator::new(1);
        conf.apply(&mut sim).unwrap();
        sim.start().unwrap();
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let conf: GatewayConf = serde_json::from_str(
            r#"{
                "gateway_id": 12345,
                "tunables": { "tx_power_dbm": 20, "echo": { "ack_wait_offset_us": 250000 } }
            }"#,
        )
        .unwrap();
        assert_eq!(conf.gateway_id, 12345);
        assert_eq!(conf.tunables.tx_power_dbm, 20);
        assert_eq!(conf.tunables.echo.ack_wait_offset_us, 250_000);
        assert_eq!(conf.tunables.echo.tx_echo_delta_us, 57_840);
        assert_eq!(conf.rf_chains.len(), 2);
        assert_eq!(conf.tunables.rx_poll_max, 16);
    }

    #[test]
    fn if_chain_json_uses_hal_field_names() {
        let ifc: RxIfConf = serde_json::from_str(
            r#"{ "enable": true, "radio": 1, "if": -300000 }"#,
        )
        .unwrap();
        assert!(ifc.enable);
        assert_eq!(ifc.rf_chain, 1);
        assert_eq!(ifc.freq_hz, -300_000);
        assert_eq!(ifc.bandwidth, 0);
    }

    #[test]
    fn bandwidth_json_speaks_hz() {
        let ifc: RxIfConf = serde_json::from_str(
            r#"{ "enable": true, "radio": 0, "if": 300000, "bandwidth": 500000, "datarate": 7 }"#,
        )
        .unwrap();
        assert_eq!(ifc.bandwidth, BW_500KHZ);
        assert_eq!(ifc.datarate, DR_LORA_SF7);

        let back = serde_json::to_value(&ifc).unwrap();
        assert_eq!(back["bandwidth"], 500_000);
    }
}
