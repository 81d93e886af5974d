pub mod advice;
pub mod api;
pub mod classifier;
pub mod config;
pub mod labels;
pub mod onnx;
pub mod predict;
pub mod prometheus;
pub mod router;
pub mod server;
pub mod severity;
pub mod uploads;
