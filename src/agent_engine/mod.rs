pub mod decision;
pub mod engine;
pub mod install;
pub mod loop_control;
pub mod state;
