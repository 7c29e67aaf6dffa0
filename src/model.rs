use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Result;
use crate::validate::OkvedCode;

/// One organization as returned by the registry search. Extra payload fields are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyRecord {
    #[serde(rename = "НаимПолн", default)]
    pub full_name: Option<String>,
    #[serde(rename = "ИНН", default)]
    pub inn: Option<String>,
    #[serde(rename = "КПП", default)]
    pub kpp: Option<String>,
    #[serde(rename = "ЮрАдрес", default)]
    pub legal_address: Option<String>,
}

/// Fetched companies grouped by the OKVED code they were found under.
///
/// Codes keep the order they were requested in, records keep API order.
/// Serialized as a JSON object `{ "<code>": [record, ...], ... }`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultSet {
    entries: Vec<(OkvedCode, Vec<CompanyRecord>)>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the records for `code`, appending if the code is already present.
    pub fn insert(&mut self, code: OkvedCode, records: Vec<CompanyRecord>) {
        match self.entries.iter_mut().find(|(c, _)| *c == code) {
            Some((_, existing)) => existing.extend(records),
            None => self.entries.push((code, records)),
        }
    }

    #[cfg(test)]
    pub fn get(&self, code: &OkvedCode) -> Option<&[CompanyRecord]> {
        self.entries
            .iter()
            .find(|(c, _)| c == code)
            .map(|(_, records)| records.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&OkvedCode, &[CompanyRecord])> {
        self.entries.iter().map(|(c, r)| (c, r.as_slice()))
    }

    /// Number of codes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn total_records(&self) -> usize {
        self.entries.iter().map(|(_, r)| r.len()).sum()
    }

    /// Write the set as pretty JSON, e.g. to split fetch and load into separate runs.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut out, self)?;
        out.flush()?;
        Ok(())
    }

    pub fn read_json(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}

impl Serialize for ResultSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (code, records) in &self.entries {
            map.serialize_entry(code, records)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ResultSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> core::result::Result<Self, D::Error> {
        struct ResultSetVisitor;

        impl<'de> Visitor<'de> for ResultSetVisitor {
            type Value = ResultSet;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of OKVED codes to company lists")
            }

            // Visiting the map directly keeps document order of the codes.
            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> core::result::Result<ResultSet, A::Error> {
                let mut set = ResultSet::new();
                while let Some((code, records)) =
                    access.next_entry::<OkvedCode, Option<Vec<CompanyRecord>>>()?
                {
                    set.insert(code, records.unwrap_or_default());
                }
                Ok(set)
            }
        }

        deserializer.deserialize_map(ResultSetVisitor)
    }
}
