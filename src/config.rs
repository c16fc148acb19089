use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

// CLI argument structure
#[derive(Parser, Debug, Clone)]
#[command(name = "traffic-monitor")]
#[command(about = "Instrumented HTTP endpoint with Redis-backed rate limiting")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, default_value_t = 5000)]
    pub port: u16,

    // Counter store (Redis) host
    #[arg(long, env = "REDIS_SERVICE_HOST", default_value = "localhost")]
    pub redis_host: String,

    // Counter store (Redis) port
    #[arg(long, env = "REDIS_SERVICE_PORT", default_value_t = 6379)]
    pub redis_port: u16,

    // Rate limit max requests per window
    #[arg(long, default_value_t = 100)]
    pub rate_limit: u64,

    // Rate limit window in seconds
    #[arg(long, default_value_t = 60)]
    pub rate_window: u64,

    // Upper bound on a single store round trip
    #[arg(long, default_value_t = 500)]
    pub store_timeout_ms: u64,

    // Directory holding metrics.json and requests.log
    #[arg(short, long, default_value = "logs")]
    pub log_dir: PathBuf,
}

impl Args {
    pub fn redis_url(&self) -> String {
        format!("redis://{}:{}/", self.redis_host, self.redis_port)
    }

    pub fn rate_window(&self) -> Duration {
        Duration::from_secs(self.rate_window)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn metrics_file(&self) -> PathBuf {
        self.log_dir.join("metrics.json")
    }

    pub fn request_log_file(&self) -> PathBuf {
        self.log_dir.join("requests.log")
    }
}
