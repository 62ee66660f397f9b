use subtle::ConstantTimeEq;

/// Header carrying the shared webhook secret
pub const WEBHOOK_SECRET_HEADER: &str = "x-webhook-secret";

/// Check a presented webhook secret against the configured one.
/// Comparison is constant-time for equal-length inputs.
pub fn verify_webhook_secret(expected: &str, presented: Option<&str>) -> bool {
    match presented {
        Some(presented) if presented.len() == expected.len() && !expected.is_empty() => {
            presented.as_bytes().ct_eq(expected.as_bytes()).into()
        }
        _ => false,
    }
}
