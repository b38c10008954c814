pub mod config;
pub mod constants;
pub mod convert;
pub mod data_lookup;
pub mod error;
pub mod frame_sink;
pub mod orchestrator;
pub mod stage;
pub mod stages;
pub mod types;

pub use config::{resolve_llm_config, ExpertStreamPolicy};
pub use data_lookup::{DataLookup, DeviceActuator, NullDataLookup, NullDeviceActuator, NullWeatherLookup, WeatherLookup};
pub use error::{PipelineError, Result};
pub use frame_sink::FrameSink;
pub use orchestrator::Orchestrator;
pub use stage::Stage;
pub use types::{IntentLabel, RoutingDecision, StageStats, TurnState};
