mod advertisement;
#[cfg(feature = "backend_btleplug")]
mod btleplug_backend;
pub mod catalog;
mod connection;
mod decoder;
mod device_type;
mod discovery;
mod identity;
mod snapshot;
mod transport;
mod updater;

pub use advertisement::Advertisement;
pub use advertisement::AdvertisementFilter;
#[cfg(feature = "backend_btleplug")]
pub use btleplug_backend::BtleplugOptions;
#[cfg(feature = "backend_btleplug")]
pub use btleplug_backend::BtleplugTransport;
pub use catalog::Characteristic;
pub use catalog::Discovered;
pub use catalog::IdentityCharacteristic;
pub use catalog::SensorCharacteristic;
pub use decoder::ByteOrder;
pub use decoder::DecodeError;
pub use decoder::DecodeSpec;
pub use decoder::WireFormat;
pub use device_type::DeviceType;
pub use discovery::Discovery;
pub use discovery::discover;
pub use identity::DeviceIdentity;
pub use snapshot::DeviceSnapshot;
pub use snapshot::SensorKey;
pub use snapshot::SensorMap;
pub use transport::DisconnectSignal;
pub use transport::GattClient;
#[cfg(test)]
pub(crate) use transport::MockTransport;
#[cfg(test)]
pub(crate) use transport::ReadBehavior;
pub use transport::Transport;
pub use transport::TransportError;
pub use updater::DEFAULT_DISCOVERY_MAX_ATTEMPTS;
pub use updater::DEFAULT_MAX_ATTEMPTS;
pub use updater::DEFAULT_UPDATE_TIMEOUT;
pub use updater::DeviceUpdater;
pub use updater::UpdateError;
pub use updater::UpdaterOptions;
