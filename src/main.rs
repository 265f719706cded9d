use std::path::Path;
use std::process::ExitCode;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use loragw_ack::debug_serial::SerialSink;
use loragw_ack::gateway::conf::GatewayConf;
use loragw_ack::gateway::Supervisor;
use loragw_ack::hal::sim::SimConcentrator;

fn main() -> ExitCode {
    let conf = match std::env::args().nth(1) {
        Some(path) => match GatewayConf::load(Path::new(&path)) {
            Ok(conf) => conf,
            Err(e) => {
                eprintln!("ERROR: {:#}", e);
                return ExitCode::FAILURE;
            }
        },
        None => GatewayConf::default(),
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if let Some(dev) = &conf.debug_serial {
        match SerialSink::open(dev) {
            Ok(sink) => {
                tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_ansi(false)
                    .with_writer(sink)
                    .init();
            }
            Err(e) => {
                eprintln!("ERROR: failed to open debug serial {}: {:#}", dev, e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!(
        gateway_id = %conf.gateway_id_string(),
        "starting acknowledgment gateway (desk-test concentrator)"
    );

    /* desk-test front-end: synthetic uplinks plus on-air self-echoes; a
       real deployment plugs the vendor HAL in here instead */
    let hal = SimConcentrator::new(42).with_traffic(40).with_echo_back();

    let sup = Supervisor::new(Box::new(hal), conf);
    let fault = sup.run();
    error!(%fault, phase = ?sup.phase(), "gateway halted, awaiting device reset");
    ExitCode::FAILURE
}
