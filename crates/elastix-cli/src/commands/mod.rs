pub mod config;
pub mod groupwise;
pub mod locate;
pub mod params;
pub mod register;
pub mod transform;
