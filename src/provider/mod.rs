//! Clients for the remote weather providers.

pub mod errors;
pub mod json;
pub mod open_meteo;
pub mod port;

pub use errors::ProviderError;
pub use open_meteo::{CurrentConditionsApi, LocationConditions, OpenMeteoClient};
pub use port::{PortClient, PortWeatherApi};
