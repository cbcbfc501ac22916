pub mod collector;
pub mod controller;
pub mod core_loop;
pub mod decision;
pub mod discovery;
pub mod error_log;
pub mod eventbus;
pub mod heartbeat;
pub mod kalman;
pub mod modem;
pub mod predictor;
pub mod rpc;
pub mod scoring;
pub mod telemetry;

pub use core_loop::CoreLoop;
pub use rpc::CoreHandle;
