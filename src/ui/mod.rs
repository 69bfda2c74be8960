pub mod console;
pub mod viewer;
