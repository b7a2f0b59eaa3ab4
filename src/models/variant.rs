//! Quantization/precision variant discovery
//!
//! Weight files follow the `<base>[_<suffix>].onnx` convention. Files are
//! grouped by suffix into variants; each variant is the minimal file set
//! needed to run that precision. External-data shards
//! (`<stem>.onnx_data`) travel with the main file of the same stem.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Extension of main weight files
pub const WEIGHT_EXTENSION: &str = ".onnx";

/// Marker of external-data shard files
pub const SHARD_MARKER: &str = ".onnx_data";

/// Known suffixes: (suffix, display name, dtype)
const SUFFIX_TABLE: &[(&str, &str, &str)] = &[
    ("", "Full Precision (fp32)", "fp32"),
    ("fp32", "Full Precision (fp32)", "fp32"),
    ("fp16", "Half Precision (fp16)", "fp16"),
    ("quantized", "Quantized (Default)", "q8"),
    ("int8", "8-bit Integer (int8)", "int8"),
    ("uint8", "8-bit Unsigned Integer (uint8)", "uint8"),
    ("q4", "4-bit Quantized (q4)", "q4"),
    ("bnb4", "4-bit BitsAndBytes (bnb4)", "bnb4"),
    ("q4f16", "4-bit Quantized fp16 (q4f16)", "q4f16"),
];

/// Variants ranked ahead of everything else, in this order
const PRIORITY: &[&str] = &[
    "Full Precision (fp32)",
    "Quantized (Default)",
    "Half Precision (fp16)",
];

/// One concrete precision build of a model's weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub suffix: String,
    pub name: String,
    pub pipeline_options: Map<String, Value>,
    /// Paths relative to the module directory
    pub files: Vec<String>,
}

/// Whether `name` is a recognized weight file or shard
pub fn is_weight_file(name: &str) -> bool {
    name.ends_with(WEIGHT_EXTENSION) || shard_stem(name).is_some()
}

fn shard_stem(name: &str) -> Option<&str> {
    let idx = name.find(SHARD_MARKER)?;
    let tail = &name[idx + SHARD_MARKER.len()..];
    let numbered = tail
        .strip_prefix('_')
        .map_or(false, |n| n.chars().all(|c| c.is_ascii_digit()));
    if tail.is_empty() || numbered {
        Some(&name[..idx])
    } else {
        None
    }
}

fn is_known_suffix(segment: &str) -> bool {
    SUFFIX_TABLE.iter().any(|(suffix, _, _)| *suffix == segment)
}

/// Split a stripped file stem into (variant key, base name)
pub fn split_suffix(stem: &str) -> (&str, &str) {
    match stem.rsplit_once('_') {
        Some((base, suffix)) if is_known_suffix(suffix) => (suffix, base),
        _ => ("", stem),
    }
}

/// Suffixes naming the same precision share one variant
fn variant_key(suffix: &str) -> &str {
    match suffix {
        "fp32" => "",
        other => other,
    }
}

/// Display name and default pipeline options for a suffix
pub fn describe_suffix(suffix: &str) -> (String, Map<String, Value>) {
    let mut options = Map::new();
    match SUFFIX_TABLE.iter().find(|(s, _, _)| *s == suffix) {
        Some((_, name, dtype)) => {
            options.insert("dtype".to_string(), Value::from(*dtype));
            (name.to_string(), options)
        }
        None => (format!("Unknown ({})", suffix), options),
    }
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn priority_rank(name: &str) -> Option<usize> {
    PRIORITY.iter().position(|p| *p == name)
}

fn bit_rank(name: &str) -> u8 {
    if name.contains("8-bit") {
        0
    } else if name.contains("4-bit") {
        1
    } else {
        2
    }
}

/// Ordering: fixed priority names first, then 8-bit, 4-bit, the rest;
/// ties broken by name.
pub fn compare_variants(a: &Variant, b: &Variant) -> Ordering {
    match (priority_rank(&a.name), priority_rank(&b.name)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => bit_rank(&a.name)
            .cmp(&bit_rank(&b.name))
            .then_with(|| a.name.cmp(&b.name)),
    }
}

/// Group weight file paths into sorted variants.
///
/// Paths may include a directory prefix (`onnx/model.onnx`); parsing uses
/// the file name only and the variant keeps the full relative path.
pub fn discover_variants(paths: &[String]) -> Vec<Variant> {
    let mut shards: HashMap<&str, Vec<&String>> = HashMap::new();
    for path in paths {
        if let Some(stem) = shard_stem(file_name(path)) {
            shards.entry(stem).or_default().push(path);
        }
    }

    // suffix -> (base names seen, files)
    let mut groups: BTreeMap<&str, (Vec<&str>, Vec<String>)> = BTreeMap::new();
    for path in paths {
        let name = file_name(path);
        let Some(stem) = name.strip_suffix(WEIGHT_EXTENSION) else {
            continue;
        };
        let (suffix, base) = split_suffix(stem);
        let (bases, files) = groups.entry(variant_key(suffix)).or_default();
        if bases.contains(&base) {
            continue;
        }
        bases.push(base);
        files.push(path.clone());
        if let Some(extra) = shards.get(stem) {
            files.extend(extra.iter().map(|p| (*p).clone()));
        }
    }

    let mut variants: Vec<Variant> = groups
        .into_iter()
        .map(|(suffix, (_, files))| {
            let (name, pipeline_options) = describe_suffix(suffix);
            Variant {
                suffix: suffix.to_string(),
                name,
                pipeline_options,
                files,
            }
        })
        .collect();
    variants.sort_by(compare_variants);
    variants
}

/// Keep `previous` if it still names a variant, else the first one
pub fn choose_selected(previous: Option<&str>, variants: &[Variant]) -> Option<String> {
    previous
        .filter(|name| variants.iter().any(|v| v.name == *name))
        .map(str::to_string)
        .or_else(|| variants.first().map(|v| v.name.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn names(variants: &[Variant]) -> Vec<&str> {
        variants.iter().map(|v| v.name.as_str()).collect()
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test_case("model_fp16", "fp16", "model" ; "half precision")]
    #[test_case("model_q4f16", "q4f16", "model" ; "q4f16")]
    #[test_case(
        "decoder_model_merged_quantized", "quantized", "decoder_model_merged"
        ; "multi underscore"
    )]
    #[test_case("encoder_model", "", "encoder_model" ; "unrecognized trailing segment")]
    #[test_case("model", "", "model" ; "no underscore")]
    fn test_split_suffix(stem: &str, suffix: &str, base: &str) {
        assert_eq!(split_suffix(stem), (suffix, base));
    }

    #[test]
    fn test_three_precisions_sorted() {
        let mut files = strings(&["model_q4.onnx", "model_fp16.onnx", "model.onnx"]);
        files.sort();
        let variants = discover_variants(&files);

        assert_eq!(
            names(&variants),
            vec![
                "Full Precision (fp32)",
                "Half Precision (fp16)",
                "4-bit Quantized (q4)"
            ]
        );
        assert_eq!(variants[0].files, vec!["model.onnx".to_string()]);
        assert_eq!(variants[1].pipeline_options["dtype"], "fp16");
    }

    #[test]
    fn test_explicit_fp32_joins_default_variant() {
        let files = strings(&["model.onnx", "model_fp32.onnx", "model_fp16.onnx"]);
        let variants = discover_variants(&files);

        assert_eq!(
            names(&variants),
            vec!["Full Precision (fp32)", "Half Precision (fp16)"]
        );
        assert_eq!(variants[0].files, strings(&["model.onnx"]));
        assert_eq!(variants[0].pipeline_options["dtype"], "fp32");
    }

    #[test]
    fn test_multi_file_single_variant() {
        let variants = discover_variants(&strings(&["encoder_model.onnx", "decoder_model.onnx"]));

        assert_eq!(variants.len(), 1);
        assert_eq!(variants[0].suffix, "");
        assert_eq!(
            variants[0].files,
            strings(&["encoder_model.onnx", "decoder_model.onnx"])
        );
    }

    #[test]
    fn test_per_variant_file_sets() {
        let files = strings(&[
            "onnx/decoder_model_merged.onnx",
            "onnx/decoder_model_merged_fp16.onnx",
            "onnx/encoder_model.onnx",
            "onnx/encoder_model_fp16.onnx",
        ]);
        let variants = discover_variants(&files);

        assert_eq!(variants.len(), 2);
        assert_eq!(
            variants[1].files,
            strings(&[
                "onnx/decoder_model_merged_fp16.onnx",
                "onnx/encoder_model_fp16.onnx"
            ])
        );
    }

    #[test]
    fn test_shards_travel_with_main_file() {
        let files = strings(&[
            "onnx/model.onnx",
            "onnx/model.onnx_data",
            "onnx/model_fp16.onnx",
            "onnx/model_fp16.onnx_data",
            "onnx/model_fp16.onnx_data_1",
        ]);
        let variants = discover_variants(&files);

        assert_eq!(
            variants[0].files,
            strings(&["onnx/model.onnx", "onnx/model.onnx_data"])
        );
        assert_eq!(variants[1].files.len(), 3);
    }

    #[test]
    fn test_unranked_variants_by_bit_width() {
        let files = strings(&[
            "model_bnb4.onnx",
            "model_int8.onnx",
            "model_q4.onnx",
            "model_uint8.onnx",
            "model_quantized.onnx",
        ]);
        let variants = discover_variants(&files);

        assert_eq!(
            names(&variants),
            vec![
                "Quantized (Default)",
                "8-bit Integer (int8)",
                "8-bit Unsigned Integer (uint8)",
                "4-bit BitsAndBytes (bnb4)",
                "4-bit Quantized (q4)"
            ]
        );
    }

    #[test]
    fn test_unknown_suffix_name() {
        let (name, options) = describe_suffix("q2");
        assert_eq!(name, "Unknown (q2)");
        assert!(options.is_empty());
    }

    #[test]
    fn test_choose_selected_preserves_previous() {
        let variants = discover_variants(&strings(&["model.onnx", "model_fp16.onnx"]));

        assert_eq!(
            choose_selected(Some("Half Precision (fp16)"), &variants).as_deref(),
            Some("Half Precision (fp16)")
        );
        assert_eq!(
            choose_selected(Some("4-bit Quantized (q4)"), &variants).as_deref(),
            Some("Full Precision (fp32)")
        );
        assert_eq!(choose_selected(None, &[]), None);
    }

    #[test]
    fn test_is_weight_file() {
        assert!(is_weight_file("model.onnx"));
        assert!(is_weight_file("model.onnx_data"));
        assert!(is_weight_file("model.onnx_data_2"));
        assert!(!is_weight_file("config.json"));
        assert!(!is_weight_file("model.onnx_database"));
    }
}
