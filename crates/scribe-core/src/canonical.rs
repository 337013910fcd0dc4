//! Deterministic canonicalization used by the CID generator (spec §4.1).
//!
//! Objects emit keys in ascending string order; arrays preserve order;
//! primitives serialize via `serde_json`'s standard encoding. The
//! recursion is locale-free and depends on no language-specific
//! reflection facility, so two independent implementations of this
//! function must produce byte-identical output for structurally equal
//! input.

use serde_json::Value;

/// Render `value` as a canonical JSON string.
pub fn canonicalize(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            out.push('{');
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key).expect("string keys always serialize"));
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        // Scalars: serde_json's own encoding is already deterministic
        // (no locale, fixed float formatting, escaped strings).
        other => out.push_str(&serde_json::to_string(other).expect("scalar serialization cannot fail")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn object_keys_are_sorted() {
        let a = json!({"b": 1, "a": 2, "c": 3});
        assert_eq!(canonicalize(&a), r#"{"a":2,"b":1,"c":3}"#);
    }

    #[test]
    fn structurally_equal_values_canonicalize_identically() {
        let a = json!({"content": "hi", "kind": 0, "created_at": 1700000000000u64});
        let b = json!({"kind": 0, "created_at": 1700000000000u64, "content": "hi"});
        assert_eq!(canonicalize(&a), canonicalize(&b));
    }

    #[test]
    fn arrays_preserve_order() {
        let a = json!([3, 1, 2]);
        assert_eq!(canonicalize(&a), "[3,1,2]");
    }

    #[test]
    fn nested_objects_sort_recursively() {
        let a = json!({"outer": {"z": 1, "a": 2}});
        assert_eq!(canonicalize(&a), r#"{"outer":{"a":2,"z":1}}"#);
    }
}
