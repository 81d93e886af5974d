use std::net::SocketAddr;
use std::ops::Deref;
use std::str::FromStr;
use std::time::Duration;

use envconfig::Envconfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlexBool(pub bool);

impl FromStr for FlexBool {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(FlexBool(true)),
            "false" | "0" | "no" | "off" | "" => Ok(FlexBool(false)),
            _ => Err(format!("Invalid boolean value: {}", s)),
        }
    }
}

impl Deref for FlexBool {
    type Target = bool;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Where advice text comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdviceBackend {
    /// OpenAI-compatible chat completions API
    OpenAi,
    /// Offline answers read from the advice/prescription table
    Lookup,
}

impl FromStr for AdviceBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(AdviceBackend::OpenAi),
            "lookup" => Ok(AdviceBackend::Lookup),
            _ => Err(format!("Unknown advice backend: {s}, must be openai or lookup")),
        }
    }
}

#[derive(Envconfig, Clone, Debug)]
pub struct Config {
    #[envconfig(default = "127.0.0.1:8000")]
    pub address: SocketAddr,

    #[envconfig(default = "best_model_optimized.onnx")]
    pub model_path: String,

    #[envconfig(default = "150")]
    pub model_input_size: u32,

    #[envconfig(default = "advice_and_prescriptions.json")]
    pub labels_path: String,

    #[envconfig(default = "uploads")]
    pub upload_dir: String,

    #[envconfig(default = "0.1")]
    pub prediction_threshold: f32,

    #[envconfig(default = "openai")]
    pub advice_backend: AdviceBackend,

    pub openai_api_key: Option<String>,

    #[envconfig(default = "https://api.openai.com/v1")]
    pub openai_base_url: String,

    #[envconfig(default = "gpt-4")]
    pub openai_model: String,

    // 0 keeps the client waiting forever
    #[envconfig(default = "0")]
    pub advice_timeout_secs: u64,

    #[envconfig(default = "52428800")]
    pub max_upload_bytes: usize,

    #[envconfig(default = "false")]
    pub export_prometheus: bool,

    #[envconfig(from = "DEBUG", default = "false")]
    pub debug: FlexBool,

    pub otel_url: Option<String>,

    #[envconfig(default = "1.0")]
    pub otel_sampling_rate: f64,

    #[envconfig(default = "triage")]
    pub otel_service_name: String,

    #[envconfig(default = "3")]
    pub otel_export_timeout_secs: u64,

    #[envconfig(from = "OTEL_LOG_LEVEL", default = "info")]
    pub otel_log_level: tracing::Level,
}

impl Config {
    pub fn advice_timeout(&self) -> Option<Duration> {
        match self.advice_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn default_test_config() -> Self {
        Self {
            address: SocketAddr::from_str("127.0.0.1:0").unwrap(),
            model_path: "best_model_optimized.onnx".to_string(),
            model_input_size: 150,
            labels_path: "advice_and_prescriptions.json".to_string(),
            upload_dir: "uploads".to_string(),
            prediction_threshold: 0.1,
            advice_backend: AdviceBackend::Lookup,
            openai_api_key: None,
            openai_base_url: "https://api.openai.com/v1".to_string(),
            openai_model: "gpt-4".to_string(),
            advice_timeout_secs: 0,
            max_upload_bytes: 52_428_800,
            export_prometheus: false,
            debug: FlexBool(false),
            otel_url: None,
            otel_sampling_rate: 1.0,
            otel_service_name: "triage".to_string(),
            otel_export_timeout_secs: 3,
            otel_log_level: tracing::Level::INFO,
        }
    }
}
