pub mod accumulator;
pub mod csd;
pub mod engine;
pub mod fft;
pub mod metric;
pub mod network;
pub mod pairs;
pub mod settings;
pub mod taper;
pub mod trial;
pub mod trial_worker;
pub mod utils;
