mod remote;
mod simulation;

pub use remote::{AnalyzeResponse, RemoteAnalyzer, RemoteError};
pub use simulation::{
    SimulationFinale, SimulationStep, SimulationTicker, CLOSING_SUMMARY, TONE_SAMPLE_GAP_SECS,
};
