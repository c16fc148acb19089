mod health;
mod home;
mod ip;
mod metrics;
mod monitor;

pub use health::health_handler;
pub use home::home_handler;
pub use ip::ip_handler;
pub use metrics::metrics_handler;
pub use monitor::monitor_handler;
