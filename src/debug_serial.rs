//! Mirrors the diagnostic output to the gateway's debug UART, so the
//! operator console still sees status lines when nothing is attached to
//! stdout. Plugged into `tracing-subscriber` as a `MakeWriter`.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use serialport::{FlowControl, Parity, SerialPort, StopBits};
use tracing_subscriber::fmt::MakeWriter;

#[derive(Clone)]
pub struct SerialSink {
    port: Arc<Mutex<Box<dyn SerialPort>>>,
}

impl SerialSink {
    pub fn open(path: &str) -> Result<Self> {
        let port = serialport::new(path, 115_200)
            .flow_control(FlowControl::None)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .timeout(Duration::from_millis(100))
            .open()?;
        Ok(Self {
            port: Arc::new(Mutex::new(port)),
        })
    }
}

pub struct SerialWriter {
    port: Arc<Mutex<Box<dyn SerialPort>>>,
}

impl Write for SerialWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut p = self.port.lock().unwrap();
        p.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.lock().unwrap().flush()
    }
}

impl<'a> MakeWriter<'a> for SerialSink {
    type Writer = SerialWriter;

    fn make_writer(&'a self) -> Self::Writer {
        SerialWriter {
            port: Arc::clone(&self.port),
        }
    }
}
