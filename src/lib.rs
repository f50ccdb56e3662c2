pub mod app;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod export;
pub mod oauth;
pub mod qbo;
pub mod reconcile;
