#![forbid(unsafe_code)]

pub mod gateway;
pub mod models;
mod rest;

pub use gateway::{DEFAULT_GATEWAY_URL, DEFAULT_INTENTS, DiscordGateway, GatewayConfig, GatewayError};
pub use rest::{DEFAULT_API_BASE_URL, DiscordRestClient};
