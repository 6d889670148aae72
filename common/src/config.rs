//! Configuration values built once at startup and passed down by reference

use crate::credentials::CredentialSource;

/// Runtime configuration for tokio and thread pools
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeConfig {
    /// Number of worker threads (0 = number of CPU cores)
    pub max_workers: usize,
    /// Number of blocking threads (0 = tokio default of 512)
    pub max_blocking_threads: usize,
}

/// Output and logging configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputConfig {
    /// Suppress error output
    pub quiet: bool,
    /// Verbosity level: 0=ERROR, 1=INFO, 2=DEBUG, 3=TRACE
    pub verbose: u8,
    /// Print summary statistics at the end
    pub print_summary: bool,
}

/// Everything the upload pipeline needs to know about the destination and the transfer.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    pub bucket: String,
    pub region: String,
    pub credentials: CredentialSource,
    /// Sustained rate in bytes per second
    pub max_rate: u64,
    /// Burst capacity of the rate limiter in bytes
    pub burst: u64,
}

impl TransferConfig {
    /// Validate configuration and return errors if invalid
    pub fn validate(&self) -> Result<(), String> {
        if self.bucket.is_empty() {
            return Err(
                "bucket must be specified with --bucket or S3_BUCKET_NAME".to_string(),
            );
        }
        if self.region.is_empty() {
            return Err("region must not be empty".to_string());
        }
        if self.max_rate == 0 {
            return Err("transfer rate must be greater than zero".to_string());
        }
        Ok(())
    }

    pub fn limiter(&self) -> throttle::Limiter {
        throttle::Limiter::with_rate(self.max_rate, self.burst)
    }
}
