//! Minimal Kubernetes resource quantity parsing (`96Mi`, `1G`, `1.5Gi`,
//! `128974848`, `129e6`, `500m`).

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

pub const MIB: f64 = 1024.0 * 1024.0;

#[derive(Debug, thiserror::Error, PartialEq)]
#[error("invalid quantity {0:?}")]
pub struct QuantityError(pub String);

/// Parse a quantity into its base-unit value (bytes for memory, cores for
/// cpu).
pub fn parse_quantity(q: &Quantity) -> Result<f64, QuantityError> {
    parse_str(q.0.trim())
}

fn parse_str(s: &str) -> Result<f64, QuantityError> {
    let err = || QuantityError(s.to_string());
    if s.is_empty() {
        return Err(err());
    }
    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '+' || c == '-'))
        .unwrap_or(s.len());
    let (number, suffix) = s.split_at(split);
    let value: f64 = number.parse().map_err(|_| err())?;
    let multiplier = match suffix {
        "" => 1.0,
        "Ki" => 1024.0,
        "Mi" => MIB,
        "Gi" => MIB * 1024.0,
        "Ti" => MIB * MIB,
        "Pi" => MIB * MIB * 1024.0,
        "Ei" => MIB * MIB * MIB,
        "n" => 1e-9,
        "u" => 1e-6,
        "m" => 1e-3,
        "k" => 1e3,
        "M" => 1e6,
        "G" => 1e9,
        "T" => 1e12,
        "P" => 1e15,
        "E" => 1e18,
        exp if exp.starts_with('e') || exp.starts_with('E') => {
            let e: i32 = exp[1..].parse().map_err(|_| err())?;
            10f64.powi(e)
        }
        _ => return Err(err()),
    };
    Ok(value * multiplier)
}
