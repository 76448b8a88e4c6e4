pub mod config;
pub mod cv;
pub mod decode;
pub mod decoder;
pub mod device;
pub mod error;
pub mod mock;
pub mod protocol;
pub mod transport;

// Re-export the facade and its collaborators for easy access
pub use config::Config;
pub use cv::Register;
pub use decoder::DecoderModel;
pub use device::Z21;
pub use error::{Error, Result};
pub use protocol::{FunctionAction, SpeedSteps};
pub use transport::{Transport, UdpTransport};
