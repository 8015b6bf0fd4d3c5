//! ID generation utilities for cogctl
//!
//! Provides functions for generating unique identifiers for loops, records and decisions.

use rand::Rng;

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

fn random_suffix() -> u16 {
    rand::rng().random()
}

/// Generate a unique loop ID
///
/// Format: `loop-{timestamp_ms}-{random_hex}`
/// Example: `loop-1738300800123-a1b2`
pub fn generate_loop_id() -> String {
    format!("loop-{}-{:04x}", now_ms(), random_suffix())
}

/// Generate a schema change proposal ID
///
/// Format: `prop-{timestamp_ms}-{random_hex}`
pub fn generate_proposal_id() -> String {
    format!("prop-{}-{:04x}", now_ms(), random_suffix())
}

/// Generate an ID for an append-only record
///
/// Format: `{prefix}-{timestamp_ms}-{random_hex}`
/// Example: `drift-1738300800123-0f3c`
pub fn generate_record_id(prefix: &str) -> String {
    format!("{}-{}-{:04x}", prefix, now_ms(), random_suffix())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_ms_returns_reasonable_timestamp() {
        let ts = now_ms();
        assert!(ts > 1577836800000); // 2020-01-01
        assert!(ts < 4102444800000); // 2100-01-01
    }

    #[test]
    fn test_generate_loop_id_format() {
        let id = generate_loop_id();
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "loop");
        assert!(parts[1].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(parts[2].len(), 4);
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generate_proposal_id_prefix() {
        assert!(generate_proposal_id().starts_with("prop-"));
    }

    #[test]
    fn test_generate_record_id_uses_prefix() {
        let id = generate_record_id("drift");
        assert!(id.starts_with("drift-"));
        assert_eq!(id.split('-').count(), 3);
    }
}
