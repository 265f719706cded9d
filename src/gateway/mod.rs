//! Control core of the gateway: one-shot configuration phase, the
//! recurring receive/ack cycle, and the single lock that keeps the two
//! mutually exclusive. Fatal hardware failures are not recovered in
//! process; they surface as a [`Fault`] and the supervisor goes to
//! [`GwState::Reset`], expecting the device to be rebooted from outside.

pub mod ack;
pub mod conf;
pub mod echo;
pub mod txwait;

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::gateway::conf::{GatewayConf, Tunables};
use crate::hal::{Concentrator, Modulation, RxPacket, STAT_CRC_OK};

/// Fatal conditions; each one escalates to a device reset.
#[derive(thiserror::Error, Debug)]
pub enum Fault {
    #[error("configuration rejected by the concentrator: {0:#}")]
    Configure(anyhow::Error),

    #[error("concentrator failed to start: {0:#}")]
    Start(anyhow::Error),

    #[error("receive poll failed: {0:#}")]
    Receive(anyhow::Error),

    #[error("send failed: {0:#}")]
    Send(anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GwState {
    Uninitialized,
    Configuring,
    Running,
    /// Terminal: recovery is a device reboot, owned by whoever runs us.
    Reset,
}

/// Mutable per-process gateway state. Only ever touched while the
/// supervisor lock is held.
#[derive(Debug, Clone, Default)]
pub struct GatewayState {
    /// Counter value of the last scheduled transmission, 0 until the
    /// first acknowledgment goes out.
    pub last_tx_us: u32,
    /// Gateway identifier, rendered once during configuration.
    pub gateway_id: String,
    pub configured: bool,
    /* diagnostic counters */
    pub rx_frames: u64,
    pub acks_sent: u64,
    pub reflections: u64,
    pub crc_drops: u64,
}

struct GatewayInner {
    hal: Box<dyn Concentrator + Send>,
    state: GatewayState,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CycleOutcome {
    /// Receive poll came back empty; caller should back off briefly.
    Idle,
    /// Number of frames handled in this cycle.
    Processed(usize),
}

/// Owns the concentrator and the gateway state behind one mutex. The
/// configuration task and the receive/ack cycle both go through that
/// mutex, so exactly one of them touches the hardware at any instant.
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Mutex<GatewayInner>>,
    conf: Arc<GatewayConf>,
    phase: Arc<Mutex<GwState>>,
}

impl Supervisor {
    pub fn new(hal: Box<dyn Concentrator + Send>, conf: GatewayConf) -> Self {
        Self {
            inner: Arc::new(Mutex::new(GatewayInner {
                hal,
                state: GatewayState::default(),
            })),
            conf: Arc::new(conf),
            phase: Arc::new(Mutex::new(GwState::Uninitialized)),
        }
    }

    pub fn phase(&self) -> GwState {
        *self.phase.lock().unwrap()
    }

    fn set_phase(&self, phase: GwState) {
        *self.phase.lock().unwrap() = phase;
    }

    /// Snapshot of the gateway state, for diagnostics and tests.
    pub fn state(&self) -> GatewayState {
        self.inner.lock().unwrap().state.clone()
    }

    /// One-shot configuration phase: submit the channel plan, start the
    /// hardware, cache the gateway identifier. Runs exactly once per
    /// process lifetime, holding the lock for the whole duration.
    pub fn configure(&self) -> Result<(), Fault> {
        self.set_phase(GwState::Configuring);
        {
            let mut g = self.inner.lock().unwrap();
            if let Err(e) = self.conf.apply(&mut *g.hal) {
                self.set_phase(GwState::Reset);
                return Err(Fault::Configure(e));
            }
            if let Err(e) = g.hal.start() {
                self.set_phase(GwState::Reset);
                return Err(Fault::Start(e));
            }
            g.state.gateway_id = self.conf.gateway_id_string();
            g.state.configured = true;
            info!(gateway_id = %g.state.gateway_id, "concentrator configured and started");
        }
        self.set_phase(GwState::Running);
        Ok(())
    }

    /// One receive/ack cycle: a single receive poll, then the full
    /// filter/ack/wait sequence for every fetched frame, all under the
    /// lock. Frame handling within a cycle is strictly sequential.
    pub fn cycle(&self) -> Result<CycleOutcome, Fault> {
        let tun = &self.conf.tunables;
        let mut g = self.inner.lock().unwrap();
        if !g.state.configured {
            return Ok(CycleOutcome::Idle);
        }

        let pkts = g.hal.receive(tun.rx_poll_max).map_err(Fault::Receive)?;
        if pkts.is_empty() {
            return Ok(CycleOutcome::Idle);
        }

        debug!(count = pkts.len(), "fetched frames");
        for pkt in &pkts {
            Self::handle_frame(&mut g, pkt, tun)?;
        }
        Ok(CycleOutcome::Processed(pkts.len()))
    }

    fn handle_frame(g: &mut GatewayInner, pkt: &RxPacket, tun: &Tunables) -> Result<(), Fault> {
        g.state.rx_frames += 1;
        debug!(%pkt, "frame");

        if pkt.modulation != Modulation::Lora {
            debug!(modulation = %pkt.modulation, "ignoring non-LoRa frame");
            return Ok(());
        }
        if pkt.status != STAT_CRC_OK {
            g.state.crc_drops += 1;
            debug!(status = pkt.status, count_us = pkt.count_us, "dropping frame without valid CRC");
            return Ok(());
        }

        let verdict = echo::classify(g.state.last_tx_us, pkt.count_us, &tun.echo);
        if verdict.is_reflection() {
            g.state.reflections += 1;
            debug!(
                %verdict,
                count_us = pkt.count_us,
                last_tx_us = g.state.last_tx_us,
                "self-reflection, no ack"
            );
            return Ok(());
        }

        let tx = ack::build(pkt, tun);
        /* the next classification must already see this transmission */
        g.state.last_tx_us = tx.count_us;
        g.hal.send(&tx).map_err(Fault::Send)?;
        g.state.acks_sent += 1;
        info!(
            freq = tx.freq_hz,
            datarate = tx.datarate,
            sched_us = tx.count_us,
            acks = g.state.acks_sent,
            "ack scheduled"
        );

        txwait::wait_tx_free(
            &mut *g.hal,
            tx.rf_chain,
            Duration::from_millis(tun.tx_poll_period_ms),
            tun.tx_poll_attempts,
        )
        .map_err(Fault::Send)?;

        Ok(())
    }

    /// Run the gateway: spawn the one-shot configuration task, then cycle
    /// until a fatal fault. Only returns in the [`GwState::Reset`] state;
    /// the caller escalates to a device reboot.
    pub fn run(&self) -> Fault {
        let (fault_tx, fault_rx) = mpsc::channel::<Fault>();

        let cfg = self.clone();
        let cfg_task = thread::Builder::new()
            .name("gw-configure".into())
            .spawn(move || {
                if let Err(fault) = cfg.configure() {
                    let _ = fault_tx.send(fault);
                }
            });
        let _cfg_task = match cfg_task {
            Ok(handle) => handle,
            Err(e) => {
                self.set_phase(GwState::Reset);
                return Fault::Start(e.into());
            }
        };

        let idle = Duration::from_millis(self.conf.tunables.idle_sleep_ms);
        loop {
            if let Ok(fault) = fault_rx.try_recv() {
                error!(%fault, "configuration failed, resetting");
                self.set_phase(GwState::Reset);
                return fault;
            }

            let configured = self.inner.lock().unwrap().state.configured;
            if !configured {
                /* configuration task still owns the hardware */
                thread::sleep(idle);
                continue;
            }

            match self.cycle() {
                Ok(CycleOutcome::Idle) => thread::sleep(idle),
                Ok(CycleOutcome::Processed(_)) => {}
                Err(fault) => {
                    error!(%fault, "fatal hardware fault, resetting");
                    self.set_phase(GwState::Reset);
                    return fault;
                }
            }
        }
    }
}
