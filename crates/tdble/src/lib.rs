pub mod config;
pub mod coordinator;
pub mod device;
pub mod logging;

pub use config::Config;
pub use config::DeviceConfig;
pub use config::LogLevel;
pub use coordinator::Coordinator;
pub use coordinator::PollState;
pub use device::DeviceSnapshot;
pub use device::DeviceUpdater;
pub use device::UpdateError;
