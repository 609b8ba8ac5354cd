use core::fmt;

use ethers::utils::keccak256;
use serde::Deserialize;
use serde_json::Value;

use crate::error::EngineError;

/// Four-byte routing key derived from a function's canonical signature.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Selector(pub [u8; 4]);

impl Selector {
    pub fn as_bytes(&self) -> [u8; 4] {
        self.0
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

/// Structured Solidity parameter type.
///
/// Parsed once from artifact JSON; canonical forms of tuples and arrays are
/// derived recursively, so selector hashing never touches raw type strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamType {
    Elementary(String),
    Array(Box<ParamType>),
    FixedArray(Box<ParamType>, usize),
    Tuple(Vec<ParamType>),
}

impl ParamType {
    pub fn canonical(&self) -> String {
        match self {
            Self::Elementary(name) => name.clone(),
            Self::Array(inner) => format!("{}[]", inner.canonical()),
            Self::FixedArray(inner, len) => format!("{}[{}]", inner.canonical(), len),
            Self::Tuple(components) => {
                let inner: Vec<String> = components.iter().map(|c| c.canonical()).collect();
                format!("({})", inner.join(","))
            }
        }
    }
}

/// A function's declared name and ordered parameter types, scoped to one
/// facet. Immutable once extracted from the facet's interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSignature {
    pub name: String,
    pub inputs: Vec<ParamType>,
}

impl FunctionSignature {
    /// Canonical textual form: `name(type1,type2)`, no whitespace.
    ///
    /// Stable across runs; the selector hash and duplicate detection both
    /// key on this string.
    pub fn canonical_form(&self) -> String {
        let inputs: Vec<String> = self.inputs.iter().map(|p| p.canonical()).collect();
        format!("{}({})", self.name, inputs.join(","))
    }

    /// keccak256 of the canonical form, truncated to four bytes.
    pub fn selector(&self) -> Selector {
        let digest = keccak256(self.canonical_form().as_bytes());
        Selector([digest[0], digest[1], digest[2], digest[3]])
    }

    /// Parses a human-readable signature, e.g. `transfer(address,uint256)`
    /// or `init((string,string,string))`.
    pub fn parse(facet: &str, signature: &str) -> Result<Self, EngineError> {
        let malformed = |reason: String| EngineError::MalformedSignature {
            facet: facet.to_owned(),
            reason,
        };
        let open = signature
            .find('(')
            .ok_or_else(|| malformed(format!("`{}` has no parameter list", signature)))?;
        let name = &signature[..open];
        if name.is_empty() {
            return Err(malformed(format!("`{}` has no function name", signature)));
        }
        let rest = &signature[open..];
        if !rest.ends_with(')') {
            return Err(malformed(format!("`{}` has an unterminated parameter list", signature)));
        }
        let inputs = split_top_level(&rest[1..rest.len() - 1])
            .into_iter()
            .map(|part| parse_type_text(facet, part))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            name: name.to_owned(),
            inputs,
        })
    }
}

impl fmt::Display for FunctionSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical_form())
    }
}

/// Interface entry classified from its declared kind field.
///
/// Constructors, fallback and receive entries carry no selector and never
/// route, so they are dropped at the parse boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbiEntry {
    Function(FunctionSignature),
    Event(FunctionSignature),
    Error(FunctionSignature),
}

impl AbiEntry {
    pub fn signature(&self) -> &FunctionSignature {
        match self {
            Self::Function(s) | Self::Event(s) | Self::Error(s) => s,
        }
    }

    pub fn canonical_form(&self) -> String {
        self.signature().canonical_form()
    }
}

#[derive(Deserialize)]
struct RawEntry {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    inputs: Vec<RawParam>,
}

#[derive(Deserialize)]
struct RawParam {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    components: Vec<RawParam>,
}

/// Parses a compiled artifact's ABI array into tagged entries.
///
/// `facet` is carried for error context only.
pub fn parse_abi(facet: &str, abi: &Value) -> Result<Vec<AbiEntry>, EngineError> {
    let raw: Vec<RawEntry> =
        serde_json::from_value(abi.clone()).map_err(|e| EngineError::MalformedSignature {
            facet: facet.to_owned(),
            reason: format!("unreadable ABI: {}", e),
        })?;
    let mut entries = Vec::new();
    for entry in &raw {
        let signature = || -> Result<FunctionSignature, EngineError> {
            let inputs = entry
                .inputs
                .iter()
                .map(|p| parse_param(facet, p))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(FunctionSignature {
                name: entry.name.clone(),
                inputs,
            })
        };
        match entry.kind.as_str() {
            "function" => entries.push(AbiEntry::Function(signature()?)),
            "event" => entries.push(AbiEntry::Event(signature()?)),
            "error" => entries.push(AbiEntry::Error(signature()?)),
            "constructor" | "fallback" | "receive" => {}
            other => {
                return Err(EngineError::MalformedSignature {
                    facet: facet.to_owned(),
                    reason: format!("unknown ABI entry kind `{}`", other),
                })
            }
        }
    }
    Ok(entries)
}

fn parse_param(facet: &str, param: &RawParam) -> Result<ParamType, EngineError> {
    let (base, suffixes) = split_array_suffixes(facet, &param.kind)?;
    let mut parsed = if base == "tuple" {
        ParamType::Tuple(
            param
                .components
                .iter()
                .map(|c| parse_param(facet, c))
                .collect::<Result<Vec<_>, _>>()?,
        )
    } else {
        ParamType::Elementary(canonical_elementary(base).ok_or_else(|| {
            EngineError::MalformedSignature {
                facet: facet.to_owned(),
                reason: format!("unknown type `{}`", param.kind),
            }
        })?)
    };
    for suffix in suffixes {
        parsed = match suffix {
            None => ParamType::Array(Box::new(parsed)),
            Some(len) => ParamType::FixedArray(Box::new(parsed), len),
        };
    }
    Ok(parsed)
}

/// Parses a type from signature text, where tuples appear as `(a,b)` rather
/// than the artifact's `tuple` + components encoding.
fn parse_type_text(facet: &str, text: &str) -> Result<ParamType, EngineError> {
    let malformed = |reason: String| EngineError::MalformedSignature {
        facet: facet.to_owned(),
        reason,
    };
    let text = text.trim();
    if text.is_empty() {
        return Err(malformed("empty parameter type".to_owned()));
    }
    if let Some(inner) = text.strip_prefix('(') {
        let close = matching_paren(inner)
            .ok_or_else(|| malformed(format!("unbalanced parentheses in `{}`", text)))?;
        let components = split_top_level(&inner[..close])
            .into_iter()
            .map(|part| parse_type_text(facet, part))
            .collect::<Result<Vec<_>, _>>()?;
        let mut parsed = ParamType::Tuple(components);
        let (rest, suffixes) = split_array_suffixes(facet, &inner[close + 1..])?;
        if !rest.is_empty() {
            return Err(malformed(format!("trailing `{}` after tuple", rest)));
        }
        for suffix in suffixes {
            parsed = match suffix {
                None => ParamType::Array(Box::new(parsed)),
                Some(len) => ParamType::FixedArray(Box::new(parsed), len),
            };
        }
        return Ok(parsed);
    }
    let (base, suffixes) = split_array_suffixes(facet, text)?;
    let mut parsed = ParamType::Elementary(
        canonical_elementary(base)
            .ok_or_else(|| malformed(format!("unknown type `{}`", base)))?,
    );
    for suffix in suffixes {
        parsed = match suffix {
            None => ParamType::Array(Box::new(parsed)),
            Some(len) => ParamType::FixedArray(Box::new(parsed), len),
        };
    }
    Ok(parsed)
}

/// Splits `uint256[3][]` into `uint256` plus suffixes `[Some(3), None]`,
/// in source order (applied innermost first).
fn split_array_suffixes<'a>(
    facet: &str,
    kind: &'a str,
) -> Result<(&'a str, Vec<Option<usize>>), EngineError> {
    let malformed = |reason: String| EngineError::MalformedSignature {
        facet: facet.to_owned(),
        reason,
    };
    let Some(first) = kind.find('[') else {
        return Ok((kind, Vec::new()));
    };
    let base = &kind[..first];
    let mut suffixes = Vec::new();
    let mut rest = &kind[first..];
    while !rest.is_empty() {
        let Some(stripped) = rest.strip_prefix('[') else {
            return Err(malformed(format!("bad array suffix in `{}`", kind)));
        };
        let close = stripped
            .find(']')
            .ok_or_else(|| malformed(format!("bad array suffix in `{}`", kind)))?;
        let dim = &stripped[..close];
        if dim.is_empty() {
            suffixes.push(None);
        } else {
            let len: usize = dim
                .parse()
                .map_err(|_| malformed(format!("bad array length `{}` in `{}`", dim, kind)))?;
            suffixes.push(Some(len));
        }
        rest = &stripped[close + 1..];
    }
    Ok((base, suffixes))
}

/// Canonical name of an elementary type, or None if it is not one.
/// `uint`/`int` aliases widen to their 256-bit canonical names.
fn canonical_elementary(name: &str) -> Option<String> {
    match name {
        "address" | "bool" | "string" | "bytes" | "function" => Some(name.to_owned()),
        "uint" => Some("uint256".to_owned()),
        "int" => Some("int256".to_owned()),
        _ => {
            if let Some(bits) = name.strip_prefix("uint").or_else(|| name.strip_prefix("int")) {
                let n: u32 = bits.parse().ok()?;
                (bits == n.to_string() && n % 8 == 0 && (8..=256).contains(&n))
                    .then(|| name.to_owned())
            } else if let Some(width) = name.strip_prefix("bytes") {
                let n: u32 = width.parse().ok()?;
                (width == n.to_string() && (1..=32).contains(&n)).then(|| name.to_owned())
            } else {
                None
            }
        }
    }
}

/// Splits on commas not nested inside parentheses or brackets.
fn split_top_level(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    if text.trim().is_empty() {
        return parts;
    }
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, c) in text.char_indices() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

/// Byte index of the parenthesis closing the one just consumed by the caller.
fn matching_paren(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                if depth == 0 {
                    return Some(i);
                }
                depth -= 1;
            }
            _ => {}
        }
    }
    None
}
