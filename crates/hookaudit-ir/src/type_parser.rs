//! Parses solc's mangled Yul type strings (`t_address`, `t_array$_t_uint256_$dyn_storage`,
//! `t_mapping$_t_address_$_t_bool_$`, ...) into a structured [`TypeStr`].
//!
//! Ported from `hookscan/utils/type_parser.py`'s `TypeParser`: a handful of simple
//! types matched by regex, and four recursive compound forms (`array`, `mapping`,
//! `tuple`, `function`) parsed by walking the head tag and recursing on the tail.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{HookauditError, Result};

/// Storage location/reference kind suffix Solidity types carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Location {
    MemoryPtr,
    CalldataPtr,
    StoragePtr,
    Storage,
}

impl Location {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "memory_ptr" => Some(Self::MemoryPtr),
            "calldata_ptr" => Some(Self::CalldataPtr),
            "storage_ptr" => Some(Self::StoragePtr),
            "storage" => Some(Self::Storage),
            _ => None,
        }
    }
}

/// Length of an array type: a fixed bound, or `dyn` for a dynamically-sized array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArrayLen {
    Fixed(u64),
    Dynamic,
}

/// Solidity function type visibility/mutability, as embedded in `t_function_*` types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionVisibility {
    Internal,
    External,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionMutability {
    View,
    Pure,
    Payable,
    Nonpayable,
}

/// A parsed solc type string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeStr {
    /// Any type matched by the simple regex table: `t_address`, `t_bool`, `t_bytesN`,
    /// `t_(u)intN`, `t_contract$_.._$N`, `t_enum$_.._$N`, `t_struct$_.._$N_<loc>`,
    /// `t_string_<loc>`, `t_bytes_<loc>`, `t_stringliteral_<hash>`, `t_rational_..`,
    /// `t_userDefinedValueType$_.._$N`. Kept as the raw matched string: these have no
    /// further structure a detector needs to reach into.
    Simple(String),
    Array {
        element: Box<TypeStr>,
        len: ArrayLen,
        location: Location,
    },
    Mapping {
        key: Box<TypeStr>,
        value: Box<TypeStr>,
    },
    Tuple(Vec<TypeStr>),
    Function {
        visibility: FunctionVisibility,
        mutability: FunctionMutability,
        args: Vec<TypeStr>,
        rets: Vec<TypeStr>,
    },
}

fn simple_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let loc = r"(memory_ptr|calldata_ptr|storage_ptr|storage)";
        let ident = r"[\w$.]+?";
        [
            format!(r"^t_address(_payable)?"),
            r"^t_bool".to_string(),
            r"^t_bytes\d+".to_string(),
            format!(r"^t_bytes_{loc}"),
            format!(r"^t_contract\$_{ident}_\$\d+"),
            format!(r"^t_enum\$_{ident}_\$\d+"),
            r"^t_int\d+".to_string(),
            r"^t_uint\d+".to_string(),
            r"^t_rational_(minus_)?\d+_by_\d+".to_string(),
            format!(r"^t_string_{loc}"),
            r"^t_stringliteral_[a-fA-F0-9]{64}".to_string(),
            format!(r"^t_struct\$_{ident}_\$\d+_{loc}"),
            format!(r"^t_userDefinedValueType\$_{ident}_\$\d+"),
        ]
        .iter()
        .map(|s| Regex::new(s).expect("static type pattern is valid"))
        .collect()
    })
}

const ARRAY_HEAD: &str = "t_array$_";
const MAPPING_HEAD: &str = "t_mapping$_";
const TUPLE_HEAD: &str = "t_tuple$_";
const TYPE_SEPARATOR: &str = "_$_";
const TYPE_END: &str = "_$";
const FUNCTION_MID: &str = "_$returns$_";

fn array_tail_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^_\$(\d+|dyn)_(memory_ptr|calldata_ptr|storage_ptr|storage)").expect("static type pattern is valid"))
}

fn function_head_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^t_function_(internal|external)_(view|pure|payable|nonpayable)\$_").expect("static type pattern is valid"))
}

/// Parses a single type string, ignoring anything left over after it.
pub fn parse(full: &str) -> Result<TypeStr> {
    let (ty, _tail) = parse_with_tail(full)?;
    Ok(ty)
}

/// Parses one type off the front of `full`, returning it and whatever remains.
pub fn parse_with_tail(full: &str) -> Result<(TypeStr, &str)> {
    if !full.starts_with("t_") {
        return Err(HookauditError::TypeString(full.to_string()));
    }

    for pattern in simple_patterns() {
        if let Some(m) = pattern.find(full) {
            if m.start() == 0 {
                let (matched, rest) = full.split_at(m.end());
                return Ok((TypeStr::Simple(matched.to_string()), rest));
            }
        }
    }

    if let Some(rest) = full.strip_prefix(ARRAY_HEAD) {
        let (element, tail) = parse_with_tail(rest)?;
        let m = array_tail_re()
            .find(tail)
            .ok_or_else(|| HookauditError::TypeString(full.to_string()))?;
        let matched = &tail[..m.end()];
        let rest = &tail[m.end()..];
        let mut parts = matched.trim_start_matches("_$").splitn(2, '_');
        let len_str = parts.next().expect("split always yields at least one part");
        let loc_str = parts.next().unwrap_or("");
        let len = if len_str == "dyn" {
            ArrayLen::Dynamic
        } else {
            ArrayLen::Fixed(len_str.parse().map_err(|_| HookauditError::TypeString(full.to_string()))?)
        };
        let location = Location::parse(loc_str).ok_or_else(|| HookauditError::TypeString(full.to_string()))?;
        return Ok((
            TypeStr::Array {
                element: Box::new(element),
                len,
                location,
            },
            rest,
        ));
    }

    if let Some(rest) = full.strip_prefix(MAPPING_HEAD) {
        let (key, tail) = parse_with_tail(rest)?;
        let tail = tail
            .strip_prefix(TYPE_SEPARATOR)
            .ok_or_else(|| HookauditError::TypeString(full.to_string()))?;
        let (value, tail) = parse_with_tail(tail)?;
        let tail = tail
            .strip_prefix(TYPE_END)
            .ok_or_else(|| HookauditError::TypeString(full.to_string()))?;
        return Ok((
            TypeStr::Mapping {
                key: Box::new(key),
                value: Box::new(value),
            },
            tail,
        ));
    }

    if let Some(rest) = full.strip_prefix(TUPLE_HEAD) {
        let (list, tail) = parse_type_list_with_tail(rest, TYPE_SEPARATOR)?;
        let tail = tail
            .strip_prefix(TYPE_END)
            .ok_or_else(|| HookauditError::TypeString(full.to_string()))?;
        return Ok((TypeStr::Tuple(list), tail));
    }

    if let Some(m) = function_head_re().find(full) {
        let visibility = if full.contains("internal") {
            FunctionVisibility::Internal
        } else {
            FunctionVisibility::External
        };
        let mutability = if full.contains("_view$") || full[..m.end()].contains("view") {
            FunctionMutability::View
        } else if full[..m.end()].contains("pure") {
            FunctionMutability::Pure
        } else if full[..m.end()].contains("nonpayable") {
            FunctionMutability::Nonpayable
        } else {
            FunctionMutability::Payable
        };
        let tail = &full[m.end()..];
        let (args, tail) = parse_type_list_with_tail(tail, TYPE_SEPARATOR)?;
        let tail = tail
            .strip_prefix(FUNCTION_MID)
            .ok_or_else(|| HookauditError::TypeString(full.to_string()))?;
        let (rets, tail) = parse_type_list_with_tail(tail, TYPE_SEPARATOR)?;
        let tail = tail
            .strip_prefix(TYPE_END)
            .ok_or_else(|| HookauditError::TypeString(full.to_string()))?;
        return Ok((
            TypeStr::Function {
                visibility,
                mutability,
                args,
                rets,
            },
            tail,
        ));
    }

    Err(HookauditError::TypeString(full.to_string()))
}

fn parse_type_list_with_tail<'a>(full: &'a str, separator: &str) -> Result<(Vec<TypeStr>, &'a str)> {
    let mut list = Vec::new();
    let mut tail = full;
    if tail.starts_with("t_") {
        loop {
            let (ty, rest) = parse_with_tail(tail)?;
            list.push(ty);
            tail = rest;
            let prefixed = format!("{separator}t_");
            if let Some(rest) = tail.strip_prefix(prefixed.as_str()) {
                tail = &tail[separator.len()..];
                let _ = rest;
            } else {
                break;
            }
        }
    }
    Ok((list, tail))
}

/// Splits a `_`-joined run of `t_...` types (as seen in multi-return Yul helper
/// function names) into individual [`TypeStr`]s, matching `parse_multi_type_str`.
pub fn parse_multi_type_str(full: &str) -> Result<(Vec<TypeStr>, &str)> {
    let mut list = Vec::new();
    let mut tail = full;
    while tail.starts_with("t_") {
        let (ty, rest) = parse_with_tail(tail)?;
        tail = rest.strip_prefix('_').unwrap_or(rest);
        list.push(ty);
    }
    Ok((list, tail))
}

/// Reports whether a type's location is in calldata, after stripping a trailing
/// `_ptr` suffix, mirroring `transform.location()`.
#[must_use]
pub fn location_of(type_str: &str) -> Option<&'static str> {
    let stripped = type_str.strip_suffix("_ptr").unwrap_or(type_str);
    if stripped.ends_with("calldata") {
        Some("calldata")
    } else if stripped.ends_with("memory") {
        Some("memory")
    } else if stripped.ends_with("storage") {
        Some("storage")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn parses_simple_types() {
        assert_eq!(parse("t_address").unwrap(), TypeStr::Simple("t_address".into()));
        assert_eq!(parse("t_uint256").unwrap(), TypeStr::Simple("t_uint256".into()));
        assert_eq!(parse("t_bool").unwrap(), TypeStr::Simple("t_bool".into()));
    }

    #[test]
    fn parses_dynamic_storage_array() {
        let ty = parse("t_array$_t_uint256_$dyn_storage").unwrap();
        match ty {
            TypeStr::Array { element, len, location } => {
                assert_eq!(*element, TypeStr::Simple("t_uint256".into()));
                assert_eq!(len, ArrayLen::Dynamic);
                assert_eq!(location, Location::Storage);
            }
            other => panic!("expected array, got {other:?}"),
        }
    }

    #[test]
    fn parses_mapping() {
        let ty = parse("t_mapping$_t_address_$_t_bool_$").unwrap();
        match ty {
            TypeStr::Mapping { key, value } => {
                assert_eq!(*key, TypeStr::Simple("t_address".into()));
                assert_eq!(*value, TypeStr::Simple("t_bool".into()));
            }
            other => panic!("expected mapping, got {other:?}"),
        }
    }

    #[test]
    fn location_of_strips_ptr_suffix() {
        assert_eq!(location_of("t_bytes_calldata_ptr"), Some("calldata"));
        assert_eq!(location_of("t_bytes_storage"), Some("storage"));
    }
}
