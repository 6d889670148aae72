/// Rate used when no limit is given: 1 GiB/s, effectively unthrottled.
pub const DEFAULT_RATE: u64 = 1024 * 1024 * 1024;

/// Burst capacity of the bucket, independent of the configured rate.
pub const DEFAULT_BURST: u64 = 100 * 1024;

const KIB: u64 = 1024;
const MIB: u64 = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateError {
    #[error("invalid transfer rate {0:?}, expected <int>, <int>k or <int>m")]
    Malformed(String),
    #[error("transfer rate must be greater than zero, got {0:?}")]
    Zero(String),
    #[error("transfer rate {0:?} is too large")]
    Overflow(String),
}

/// Parses a transfer rate in bytes per second.
///
/// Accepted forms are an empty string (defaults to [`DEFAULT_RATE`]), a bare integer (bytes/s)
/// and an integer followed by `k`/`K` (KiB/s) or `m`/`M` (MiB/s).
pub fn parse_rate(rate: &str) -> Result<u64, RateError> {
    if rate.is_empty() {
        return Ok(DEFAULT_RATE);
    }
    let (digits, multiplier) = if let Some(digits) = rate.strip_suffix(['k', 'K']) {
        (digits, KIB)
    } else if let Some(digits) = rate.strip_suffix(['m', 'M']) {
        (digits, MIB)
    } else {
        (rate, 1)
    };
    // u64::from_str would also accept a leading '+'
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(RateError::Malformed(rate.to_string()));
    }
    let value: u64 = digits
        .parse()
        .map_err(|_| RateError::Overflow(rate.to_string()))?;
    if value == 0 {
        return Err(RateError::Zero(rate.to_string()));
    }
    value
        .checked_mul(multiplier)
        .ok_or_else(|| RateError::Overflow(rate.to_string()))
}
