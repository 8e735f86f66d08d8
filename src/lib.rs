pub mod config;
pub mod error;
pub mod influx;
pub mod logging;
pub mod normalize;
pub mod pipeline;
pub mod reading;
pub mod sensor;
