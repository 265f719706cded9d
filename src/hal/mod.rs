
pub mod error;
pub mod sim;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/* radio-specific parameters */
pub const LGW_RF_CHAIN_NB: u8 = 2;      /* number of RF chains */
pub const LGW_IF_CHAIN_NB: u8 = 10;     /* number of IF+modem RX chains */
pub const LGW_MULTI_NB: u8 = 8;         /* number of LoRa 'multi SF' chains */

/* values available for the 'bandwidth' parameters (LoRa only here) */
/* NOTE: directly encode the HAL bandwidth codes, do not change */
pub const BW_UNDEFINED: u8 = 0;
pub const BW_500KHZ: u8 = 0x06;
pub const BW_250KHZ: u8 = 0x05;
pub const BW_125KHZ: u8 = 0x04;

/* values available for the 'datarate' parameters */
pub const DR_UNDEFINED: u32 = 0;
pub const DR_LORA_SF5: u32 = 5;
pub const DR_LORA_SF6: u32 = 6;
pub const DR_LORA_SF7: u32 = 7;
pub const DR_LORA_SF8: u32 = 8;
pub const DR_LORA_SF9: u32 = 9;
pub const DR_LORA_SF10: u32 = 10;
pub const DR_LORA_SF11: u32 = 11;
pub const DR_LORA_SF12: u32 = 12;

/* values available for the 'coderate' parameters (LoRa only) */
/* NOTE: arbitrary values */
pub const CR_UNDEFINED: u8 = 0;
pub const CR_LORA_4_5: u8 = 0x01;
pub const CR_LORA_4_6: u8 = 0x02;
pub const CR_LORA_4_7: u8 = 0x03;
pub const CR_LORA_4_8: u8 = 0x04;

/* CRC status of a received packet */
pub const STAT_UNDEFINED: u8 = 0x00;
pub const STAT_NO_CRC: u8 = 0x01;
pub const STAT_CRC_BAD: u8 = 0x11;
pub const STAT_CRC_OK: u8 = 0x10;

/* maximum payload size the concentrator FIFO can hold */
pub const LGW_PKT_PAYLOAD_MAX: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(u8)]
pub enum Modulation {
    Undefined = 0,
    Cw = 0x08,
    Lora = 0x10,
    Fsk = 0x20,
}

impl std::fmt::Display for Modulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Modulation::Undefined => write!(f, "Undefined"),
            Modulation::Cw => write!(f, "CW"),
            Modulation::Lora => write!(f, "LoRa"),
            Modulation::Fsk => write!(f, "FSK"),
        }
    }
}

/* values available for the 'tx_mode' parameter */
#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(u8)]
pub enum TxMode {
    Immediate = 0,
    Timestamped = 1,
    OnGps = 2,
}

/* state of the TX modem as reported by the concentrator */
#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(u8)]
pub enum TxStatus {
    Unknown = 0,
    Off = 1,        /* TX modem disabled, it will ignore commands */
    Free = 2,       /* TX modem is free, ready to receive a command */
    Scheduled = 3,  /* TX modem is loaded, will send after an event and/or delay */
    Emitting = 4,   /* TX modem is emitting */
}

impl TxStatus {
    pub fn is_free(&self) -> bool {
        matches!(self, TxStatus::Free)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RadioType {
    #[serde(rename = "NONE")]
    None,
    #[serde(rename = "SX1255")]
    Sx1255,
    #[serde(rename = "SX1257")]
    Sx1257,
    #[serde(rename = "SX1250")]
    Sx1250,
}

impl std::fmt::Display for RadioType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RadioType::None => write!(f, "None"),
            RadioType::Sx1255 => write!(f, "SX1255"),
            RadioType::Sx1257 => write!(f, "SX1257"),
            RadioType::Sx1250 => write!(f, "SX1250"),
        }
    }
}

/**
@struct BoardConf
@brief Configuration structure for board specificities
*/
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardConf {
    pub lorawan_public: bool,   //* Enable ONLY for *public* networks using the LoRa MAC protocol */
    pub clksrc: u8,             //* Index of RF chain which provides clock to concentrator */
}

impl Default for BoardConf {
    fn default() -> Self {
        Self {
            lorawan_public: true,
            clksrc: 1,
        }
    }
}

/**
@struct RxRfConf
@brief Configuration structure for one RF chain
*/
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RxRfConf {
    pub enable: bool,           //* enable or disable that RF chain */
    #[serde(rename = "freq")]
    pub freq_hz: u32,           //* center frequency of the radio in Hz */
    pub rssi_offset: f32,       //* Board-specific RSSI correction factor */
    #[serde(rename = "type")]
    pub _type: RadioType,       //* Radio type for that RF chain (SX1255, SX1257....) */
    pub tx_enable: bool,        //* enable or disable TX on that RF chain */
}

impl Default for RxRfConf {
    fn default() -> Self {
        Self {
            enable: false,
            freq_hz: 0,
            rssi_offset: 0.0,
            _type: RadioType::None,
            tx_enable: false,
        }
    }
}

/**
@struct RxIfConf
@brief Configuration structure for an IF chain
*/
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RxIfConf {
    pub enable: bool,           //* enable or disable that IF chain */
    #[serde(rename = "radio")]
    pub rf_chain: u8,           //* to which RF chain is that IF chain associated */
    #[serde(rename = "if")]
    pub freq_hz: i32,           //* center freq of the IF chain, relative to RF chain frequency */
    #[serde(default, with = "bandwidth_serde")]
    pub bandwidth: u8,          //* RX bandwidth, 0 for default */
    #[serde(default)]
    pub datarate: u32,          //* RX datarate, 0 for default */
}

/* the configuration file speaks Hz, the HAL speaks bandwidth codes */
mod bandwidth_serde {
    use serde::{de, Deserialize, Deserializer, Serializer};

    use super::{BW_125KHZ, BW_250KHZ, BW_500KHZ, BW_UNDEFINED};

    pub fn serialize<S>(value: &u8, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let hz: u32 = match *value {
            BW_125KHZ => 125_000,
            BW_250KHZ => 250_000,
            BW_500KHZ => 500_000,
            _ => 0,
        };
        serializer.serialize_u32(hz)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u8, D::Error>
    where
        D: Deserializer<'de>,
    {
        match u32::deserialize(deserializer)? {
            500_000 => Ok(BW_500KHZ),
            250_000 => Ok(BW_250KHZ),
            125_000 => Ok(BW_125KHZ),
            0 => Ok(BW_UNDEFINED),
            other => Err(de::Error::custom(format!(
                "invalid bandwidth value: {}",
                other
            ))),
        }
    }
}

impl Default for RxIfConf {
    fn default() -> Self {
        Self {
            enable: false,
            rf_chain: 0,
            freq_hz: 0,
            bandwidth: BW_UNDEFINED,
            datarate: DR_UNDEFINED,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TxGain {
    pub rf_power: i8,           //* measured TX power at the board connector, in dBm */
    #[serde(default)]
    pub dig_gain: u8,           //* 2 bits: control of the digital gain */
    #[serde(default)]
    pub pa_gain: u8,            //* 2 bits: control of the external PA */
    #[serde(default)]
    pub dac_gain: u8,           //* 2 bits: control of the radio DAC */
    #[serde(default)]
    pub mix_gain: u8,           //* 4 bits: control of the radio mixer */
}

/**
@struct RxPacket
@brief Metadata of a received packet together with its payload
*/
#[derive(Debug, Clone, Copy)]
pub struct RxPacket {
    pub freq_hz: u32,           /* central frequency of the IF chain */
    pub if_chain: u8,           /* by which IF chain was packet received */
    pub status: u8,             /* CRC status of the received packet */
    pub count_us: u32,          /* internal concentrator counter for timestamping, 1 microsecond resolution */
    pub rf_chain: u8,           /* through which RF chain the packet was received */
    pub modulation: Modulation, /* modulation used by the packet */
    pub bandwidth: u8,          /* modulation bandwidth (LoRa only) */
    pub datarate: u32,          /* RX datarate of the packet (SF for LoRa) */
    pub coderate: u8,           /* error-correcting code of the packet (LoRa only) */
    pub rssi: f32,              /* average RSSI of the signal in dB */
    pub snr: f32,               /* average packet SNR, in dB (LoRa only) */
    pub size: u16,              /* payload size in bytes */
    pub payload: [u8; LGW_PKT_PAYLOAD_MAX],
}

impl RxPacket {
    pub fn new() -> Self {
        Self {
            freq_hz: 0,
            if_chain: 0,
            status: STAT_UNDEFINED,
            count_us: 0,
            rf_chain: 0,
            modulation: Modulation::Undefined,
            bandwidth: BW_UNDEFINED,
            datarate: DR_UNDEFINED,
            coderate: CR_UNDEFINED,
            rssi: 0.0,
            snr: 0.0,
            size: 0,
            payload: [0; LGW_PKT_PAYLOAD_MAX],
        }
    }
}

impl Default for RxPacket {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RxPacket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "RxPacket {{ freq_hz: {}, if_chain: {}, status: {:#04X}, count_us: {}, rf_chain: {}, modulation: {}, bandwidth: {:#04X}, datarate: {}, coderate: {:#04X}, rssi: {}, snr: {}, size: {}, payload: {:02X?} }}",
            self.freq_hz,
            self.if_chain,
            self.status,
            self.count_us,
            self.rf_chain,
            self.modulation,
            self.bandwidth,
            self.datarate,
            self.coderate,
            self.rssi,
            self.snr,
            self.size,
            &self.payload[..self.size as usize],
        )
    }
}

/**
@struct TxPacket
@brief Configuration of a packet to send together with its payload
*/
#[derive(Debug, Clone, Copy)]
pub struct TxPacket {
    pub freq_hz: u32,           /* center frequency of TX */
    pub tx_mode: TxMode,        /* select on what event/time the TX is triggered */
    pub count_us: u32,          /* timestamp in microseconds for TX trigger */
    pub rf_chain: u8,           /* through which RF chain will the packet be sent */
    pub rf_power: i8,           /* TX power, in dBm */
    pub modulation: Modulation, /* modulation to use for the packet */
    pub bandwidth: u8,          /* modulation bandwidth (LoRa only) */
    pub datarate: u32,          /* TX datarate (SF for LoRa) */
    pub coderate: u8,           /* error-correcting code of the packet (LoRa only) */
    pub invert_pol: bool,       /* invert signal polarity, for orthogonal downlinks (LoRa only) */
    pub preamble: u16,          /* set the preamble length, 0 for default */
    pub no_crc: bool,           /* if true, do not send a CRC in the packet */
    pub size: u16,              /* payload size in bytes */
    pub payload: [u8; LGW_PKT_PAYLOAD_MAX],
}

impl Default for TxPacket {
    fn default() -> Self {
        Self {
            freq_hz: 0,
            tx_mode: TxMode::Immediate,
            count_us: 0,
            rf_chain: 0,
            rf_power: 0,
            modulation: Modulation::Undefined,
            bandwidth: BW_UNDEFINED,
            datarate: DR_UNDEFINED,
            coderate: CR_UNDEFINED,
            invert_pol: false,
            preamble: 0,
            no_crc: false,
            size: 0,
            payload: [0; LGW_PKT_PAYLOAD_MAX],
        }
    }
}

impl std::fmt::Display for TxPacket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "TxPacket {{ freq_hz: {}, tx_mode: {:?}, count_us: {}, rf_chain: {}, rf_power: {}, modulation: {}, bandwidth: {:#04X}, datarate: {}, coderate: {:#04X}, invert_pol: {}, preamble: {}, size: {}, payload: {:02X?} }}",
            self.freq_hz,
            self.tx_mode,
            self.count_us,
            self.rf_chain,
            self.rf_power,
            self.modulation,
            self.bandwidth,
            self.datarate,
            self.coderate,
            self.invert_pol,
            self.preamble,
            self.size,
            &self.payload[..self.size as usize],
        )
    }
}

/// Interface to the concentrator front-end. The production implementation
/// drives the SX13xx HAL over its COM link; `sim::SimConcentrator` provides a
/// software stand-in for desk testing.
pub trait Concentrator {
    fn board_setconf(&mut self, conf: &BoardConf) -> Result<()>;
    fn rxrf_setconf(&mut self, rf_chain: u8, conf: &RxRfConf) -> Result<()>;
    fn rxif_setconf(&mut self, if_chain: u8, conf: &RxIfConf) -> Result<()>;
    fn txgain_setconf(&mut self, rf_chain: u8, lut: &[TxGain]) -> Result<()>;
    fn start(&mut self) -> Result<()>;
    /// Non-blocking fetch of at most `max_pkt` packets from the RX FIFO.
    fn receive(&mut self, max_pkt: usize) -> Result<Vec<RxPacket>>;
    /// Non-blocking: loads the packet into the TX modem and returns. Use
    /// `tx_status` to find out when the modem is free again.
    fn send(&mut self, pkt: &TxPacket) -> Result<()>;
    fn tx_status(&mut self, rf_chain: u8) -> Result<TxStatus>;
}
