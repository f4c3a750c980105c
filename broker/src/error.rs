use thiserror::Error;
use voltepatch::broker::BrokerError;
use voltepatch::carrier::CarrierConfigError;

#[derive(Debug, Error)]
pub enum VoltepatchError {
    #[error("Overrides file parsing error: {0}")]
    OverridesFileParsingError(#[from] toml::de::Error),
    #[error("Failed to read overrides file: {0}")]
    OverridesFileReadError(std::io::Error),
    #[error("Invalid override argument: {0}")]
    InvalidOverrideArgument(String),
    #[error("{0}")]
    BrokerError(#[from] BrokerError),
    #[error("Carrier config error: {0}")]
    CarrierConfigError(#[from] CarrierConfigError),
}
