pub mod steps;

pub use steps::{CompiledStep, StepResult, apply_steps, process_events};
