use std::path::Path;
use std::str::FromStr;

use log::warn;
use voltepatch::bundle::{Bundle, BundleValue};

use crate::error::VoltepatchError;

/// Builds the invocation's argument bundle from an optional TOML overrides
/// file plus KEY=VALUE pairs from the command line. Pairs win over file
/// entries with the same key.
pub fn collect(file: Option<&Path>, pairs: &[String]) -> Result<Bundle, VoltepatchError> {
    let mut bundle = match file {
        Some(path) => parse_file(path)?,
        None => Bundle::new(),
    };
    for pair in pairs {
        let (key, value) = parse_pair(pair)?;
        bundle.insert(key, value);
    }
    Ok(bundle)
}

fn parse_file(path: &Path) -> Result<Bundle, VoltepatchError> {
    let contents =
        std::fs::read_to_string(path).map_err(VoltepatchError::OverridesFileReadError)?;
    Ok(toml::from_str(&contents)?)
}

fn parse_pair(pair: &str) -> Result<(String, BundleValue), VoltepatchError> {
    let Some((key, raw)) = pair.split_once('=') else {
        return Err(VoltepatchError::InvalidOverrideArgument(format!(
            "expected KEY=VALUE, got {pair}"
        )));
    };
    let value = typed_value(key, raw)?;
    Ok((key.to_string(), value))
}

// Carrier config keys carry their value type in the key-name suffix
// (carrier_volte_available_bool, ims.wfc_timer_int, ...), so the suffix
// decides how the raw text is parsed. Array values are comma separated.
fn typed_value(key: &str, raw: &str) -> Result<BundleValue, VoltepatchError> {
    let invalid = |expected: &str| {
        VoltepatchError::InvalidOverrideArgument(format!("{key}: expected {expected}, got {raw}"))
    };
    let value = if key.ends_with("_bool") {
        BundleValue::Bool(raw.parse().map_err(|_| invalid("a boolean"))?)
    } else if key.ends_with("_bool_array") {
        BundleValue::BoolArray(parse_list(raw).map_err(|_| invalid("booleans"))?)
    } else if key.ends_with("_int") {
        BundleValue::Int(raw.parse().map_err(|_| invalid("an i32"))?)
    } else if key.ends_with("_int_array") {
        BundleValue::IntArray(parse_list(raw).map_err(|_| invalid("i32s"))?)
    } else if key.ends_with("_long") {
        BundleValue::Long(raw.parse().map_err(|_| invalid("an i64"))?)
    } else if key.ends_with("_long_array") {
        BundleValue::LongArray(parse_list(raw).map_err(|_| invalid("i64s"))?)
    } else if key.ends_with("_double") {
        BundleValue::Double(raw.parse().map_err(|_| invalid("a double"))?)
    } else if key.ends_with("_double_array") {
        BundleValue::DoubleArray(parse_list(raw).map_err(|_| invalid("doubles"))?)
    } else if key.ends_with("_string_array") {
        BundleValue::StringArray(parse_list(raw).map_err(|_| invalid("strings"))?)
    } else if key.ends_with("_string") {
        BundleValue::String(raw.to_string())
    } else {
        warn!("no type suffix on key {key}, treating value as a string");
        BundleValue::String(raw.to_string())
    };
    Ok(value)
}

fn parse_list<T: FromStr>(raw: &str) -> Result<Vec<T>, T::Err> {
    if raw.is_empty() {
        return Ok(Vec::new());
    }
    raw.split(',').map(|item| item.trim().parse()).collect()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_suffix_typing() {
        assert_eq!(
            typed_value("carrier_volte_available_bool", "true").unwrap(),
            BundleValue::Bool(true)
        );
        assert_eq!(
            typed_value("ims.wfc_timer_int", "30").unwrap(),
            BundleValue::Int(30)
        );
        assert_eq!(
            typed_value("data_limit_long", "4294967296").unwrap(),
            BundleValue::Long(4294967296)
        );
        assert_eq!(
            typed_value("rsrp_thresholds_int_array", "-128, -118, -108").unwrap(),
            BundleValue::IntArray(vec![-128, -118, -108])
        );
        assert_eq!(
            typed_value("gbr_dl_long_array", "1,4294967296").unwrap(),
            BundleValue::LongArray(vec![1, 4294967296])
        );
        assert_eq!(
            typed_value("snr_range_double_array", "0.5,1.5").unwrap(),
            BundleValue::DoubleArray(vec![0.5, 1.5])
        );
        assert_eq!(
            typed_value("carrier_name_string", "Verizon").unwrap(),
            BundleValue::String("Verizon".to_string())
        );
        assert_eq!(
            typed_value("mcc_mnc_string_array", "310260,310120").unwrap(),
            BundleValue::StringArray(vec!["310260".to_string(), "310120".to_string()])
        );
        assert_eq!(
            typed_value("flags_bool_array", "true,false").unwrap(),
            BundleValue::BoolArray(vec![true, false])
        );
    }

    #[test]
    fn test_unsuffixed_key_falls_back_to_string() {
        assert_eq!(
            typed_value("mystery_key", "42").unwrap(),
            BundleValue::String("42".to_string())
        );
    }

    #[test]
    fn test_bad_value_for_suffix_is_an_error() {
        assert!(typed_value("x_int", "notanumber").is_err());
        assert!(typed_value("x_bool", "yes").is_err());
        assert!(typed_value("x_int_array", "1,two,3").is_err());
    }

    #[test]
    fn test_pair_without_equals_is_an_error() {
        assert!(parse_pair("carrier_volte_available_bool").is_err());
    }

    #[test]
    fn test_collect_merges_file_and_pairs() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "\"carrier_volte_available_bool\" = false").unwrap();
        writeln!(file, "\"ims.wfc_timer_int\" = 30").unwrap();
        file.flush().unwrap();

        let pairs = vec!["carrier_volte_available_bool=true".to_string()];
        let bundle = collect(Some(file.path()), &pairs).unwrap();

        // the CLI pair overrides the file entry
        assert_eq!(
            bundle.get("carrier_volte_available_bool"),
            Some(&BundleValue::Bool(true))
        );
        assert_eq!(bundle.get("ims.wfc_timer_int"), Some(&BundleValue::Int(30)));
    }

    #[test]
    fn test_collect_with_no_sources_is_empty() {
        let bundle = collect(None, &[]).unwrap();
        assert!(bundle.is_empty());
    }
}
