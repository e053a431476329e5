pub mod prices;
pub mod provider;
pub mod types;
