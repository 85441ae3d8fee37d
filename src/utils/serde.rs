/*!
 * Serde helpers for configuration values that users write loosely.
 */

use serde::{Deserialize, Deserializer};

/// Deserialize an optional count that may be written as a number or a string.
///
/// Accepted forms:
/// - missing or `null` -> `None`
/// - a non-negative integer
/// - a string holding a non-negative integer
///
/// ```rust
/// use serde::Deserialize;
/// use turntable::utils::serde::deserialize_optional_count;
///
/// #[derive(Deserialize)]
/// struct Settings {
///     #[serde(default, deserialize_with = "deserialize_optional_count")]
///     batch_size: Option<usize>,
/// }
///
/// let settings: Settings = serde_yaml::from_str(r#"batch_size: "250""#).unwrap();
/// assert_eq!(settings.batch_size, Some(250));
/// ```
pub fn deserialize_optional_count<'de, D>(deserializer: D) -> Result<Option<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<serde_yaml::Value> = Option::deserialize(deserializer)?;
    parse_count::<D>(value, false)
}

/// Like [`deserialize_optional_count`], but `"auto"` also means `None`
/// (resolve the worker count from the host's cores).
///
/// ```yaml
/// processes: 8        # explicit
/// processes: "8"      # quoted
/// processes: auto     # cores, capped by max_processes
/// processes: null     # same as auto
/// ```
pub fn deserialize_worker_count<'de, D>(deserializer: D) -> Result<Option<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<serde_yaml::Value> = Option::deserialize(deserializer)?;
    parse_count::<D>(value, true)
}

fn parse_count<'de, D>(value: Option<serde_yaml::Value>, allow_auto: bool) -> Result<Option<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match value {
        None | Some(serde_yaml::Value::Null) => Ok(None),
        Some(serde_yaml::Value::Number(n)) => n
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("Expected a non-negative integer, found: {n}"))),
        Some(serde_yaml::Value::String(s)) => {
            let trimmed = s.trim();
            if allow_auto && trimmed.eq_ignore_ascii_case("auto") {
                return Ok(None);
            }
            trimmed
                .parse::<usize>()
                .map(Some)
                .map_err(|_| D::Error::custom(format!("Cannot parse '{s}' as a count")))
        }
        Some(other) => Err(D::Error::custom(format!(
            "Expected a count, found: {other:?}"
        ))),
    }
}
