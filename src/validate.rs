use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};

static OKVED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{2}(\.\d{2}(\.\d{1,2})?)?$").unwrap());

/// OKVED classification code: `DD`, `DD.DD`, `DD.DD.D` or `DD.DD.DD`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OkvedCode(String);

impl OkvedCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for OkvedCode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        // `\d` is Unicode-aware, so pin the code to ASCII digits as well.
        if s.is_ascii() && OKVED_RE.is_match(s) {
            Ok(OkvedCode(s.to_string()))
        } else {
            Err(Error::invalid("OKVED code", s))
        }
    }
}

impl TryFrom<String> for OkvedCode {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<OkvedCode> for String {
    fn from(value: OkvedCode) -> Self {
        value.0
    }
}

impl fmt::Display for OkvedCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Search region identifier, always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionCode(u32);

impl RegionCode {
    pub fn get(self) -> u32 {
        self.0
    }
}

impl FromStr for RegionCode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().parse::<u32>() {
            Ok(n) if n > 0 => Ok(RegionCode(n)),
            _ => Err(Error::invalid("region", s)),
        }
    }
}

impl fmt::Display for RegionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Validated inputs of a fetch run.
#[derive(Debug, Clone)]
pub struct SearchInput {
    pub codes: Vec<OkvedCode>,
    pub region: RegionCode,
}

/// Check the code list and region before any I/O happens.
///
/// Duplicate codes keep their first position only.
pub fn validate_inputs<S: AsRef<str>>(codes: &[S], region: Option<&str>) -> Result<SearchInput> {
    if codes.is_empty() {
        return Err(Error::MissingInput("OKVED code list is empty"));
    }

    let mut parsed: Vec<OkvedCode> = Vec::with_capacity(codes.len());
    for raw in codes {
        let code: OkvedCode = raw.as_ref().parse()?;
        if parsed.contains(&code) {
            warn!("Duplicate OKVED code {} ignored", code);
            continue;
        }
        parsed.push(code);
    }

    let region = match region {
        Some(r) if !r.trim().is_empty() => r.parse()?,
        _ => return Err(Error::MissingInput("region is not set")),
    };

    Ok(SearchInput {
        codes: parsed,
        region,
    })
}
