//! Human-friendly byte sizes.
//!
//! Sizes may be written as plain integers or as strings with a binary unit
//! suffix (`"64k"`, `"1.5MiB"`, `"2 gb"`).

use serde::{Deserialize, Deserializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum SizeValue {
    Num(usize),
    Str(String),
}

/// Parses a size string into bytes.
pub fn parse_size(input: &str) -> Result<usize, String> {
    let input = input.trim();
    let split = input
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(input.len());
    let (num_part, unit_part) = input.split_at(split);

    let number: f64 = num_part
        .parse()
        .map_err(|_| format!("invalid size '{input}'"))?;
    let multiplier = match unit_part.trim().to_lowercase().as_str() {
        "" | "b" => 1.0,
        "k" | "kb" | "kib" => 1024.0,
        "m" | "mb" | "mib" => 1024.0 * 1024.0,
        "g" | "gb" | "gib" => 1024.0 * 1024.0 * 1024.0,
        unit => return Err(format!("unknown size unit '{unit}'")),
    };

    let bytes = number * multiplier;
    if !bytes.is_finite() || bytes >= usize::MAX as f64 {
        return Err(format!("size '{input}' does not fit in memory"));
    }
    if bytes.fract() != 0.0 {
        return Err(format!("size '{input}' is not a whole number of bytes"));
    }
    Ok(bytes as usize)
}

/// Custom deserializer accepting either a number of bytes or a size string.
pub fn deserialize_size<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    match SizeValue::deserialize(deserializer)? {
        SizeValue::Num(n) => Ok(n),
        SizeValue::Str(s) => parse_size(&s).map_err(serde::de::Error::custom),
    }
}
