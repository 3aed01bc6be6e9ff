pub mod accuracy;
pub mod heart_rate;

pub use accuracy::{interoceptive_accuracy, WindowScore, WindowedBeatCounter};
pub use heart_rate::{estimate_heart_rate, mean_bpm, HrSample};
