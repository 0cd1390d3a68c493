mod climate;
mod weather;

pub use climate::{CLIMATE_HEADER, ClimateExtract, ClimateRow};
pub use weather::{Coordinates, FetchStatus, WeatherRecord};
