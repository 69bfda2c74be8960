pub mod annotator;
pub mod pipeline;
pub mod registry;
pub mod remote_detector;
pub mod screenshot;
pub mod traits;
pub mod types;
pub mod window;
pub mod yolo_detector;
