pub mod ppg;

pub use ppg::{
    detect_heartbeats, find_peaks, heartbeat_peaks, resting_rr_interval, run_heart_rate_pipeline,
    HeartRatePipelineResult, PeakCriteria,
};
