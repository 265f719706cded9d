pub mod debug_serial;
pub mod gateway;
pub mod hal;

pub use gateway::{CycleOutcome, Fault, GatewayState, GwState, Supervisor};
