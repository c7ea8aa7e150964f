use std::{env, net::SocketAddr, path::PathBuf, time::Duration};

use anyhow::Result;

pub const MAX_UPLOAD_BYTES_DEFAULT: u64 = 50 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub storage_root: PathBuf,
    pub retention: Duration,
    pub sweep_interval: Duration,
    pub queue_capacity: usize,
    pub max_upload_bytes: u64,
    pub separator_cmd: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let bind_raw =
            env::var("SPLITAI_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
        let bind_addr = bind_raw
            .trim()
            .parse::<SocketAddr>()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 8080)));

        let storage_root =
            PathBuf::from(env::var("SPLITAI_STORAGE_ROOT").unwrap_or_else(|_| "storage".to_string()));

        let retention_seconds = env::var("SPLITAI_RETENTION_SECONDS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(24 * 60 * 60);

        let sweep_interval_seconds = env::var("SPLITAI_SWEEP_INTERVAL_SECONDS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(60 * 60);

        let queue_capacity = env::var("SPLITAI_QUEUE_CAPACITY")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(128);

        let max_upload_bytes = env::var("SPLITAI_MAX_UPLOAD_BYTES")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(MAX_UPLOAD_BYTES_DEFAULT);

        let separator_cmd =
            env::var("SPLITAI_SEPARATOR_CMD").unwrap_or_else(|_| "demucs-split".to_string());

        Ok(Self {
            bind_addr,
            storage_root,
            retention: Duration::from_secs(retention_seconds),
            sweep_interval: Duration::from_secs(sweep_interval_seconds),
            queue_capacity,
            max_upload_bytes,
            separator_cmd,
        })
    }
}
