use std::collections::HashMap;
use std::fs;

use camino::Utf8Path;

use crate::domain::Lang;
use crate::error::CrawlError;
use crate::parse::html::collapse_whitespace;

const BUNDLED_TABLE: &str = include_str!("../data/header_mapping.tsv");
const HEADER: [&str; 4] = ["raw_ja", "raw_en", "norm_ja", "norm_en"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingRow {
    pub raw_ja: String,
    pub raw_en: String,
    pub norm_ja: String,
    pub norm_en: String,
}

/// Bilingual normalization table for molecular-data headers. Built once at
/// startup and shared by reference.
#[derive(Debug, Clone, Default)]
pub struct MappingTable {
    rows: Vec<MappingRow>,
    ja: HashMap<String, String>,
    en: HashMap<String, String>,
    ja_to_en: HashMap<String, String>,
}

impl MappingTable {
    /// The table shipped with the crate.
    pub fn bundled() -> Result<Self, CrawlError> {
        Self::parse(BUNDLED_TABLE)
    }

    pub fn load(path: &Utf8Path) -> Result<Self, CrawlError> {
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| CrawlError::MappingTable(format!("read {path}: {err}")))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, CrawlError> {
        let mut table = Self::default();
        let mut seen_header = false;
        for (idx, line) in content.lines().enumerate() {
            let line_no = idx + 1;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let fields = line.split('\t').map(str::trim).collect::<Vec<_>>();
            if fields.len() != 4 {
                return Err(CrawlError::MappingTable(format!(
                    "line {line_no}: expected 4 tab-separated fields, found {}",
                    fields.len()
                )));
            }
            if !seen_header {
                if fields != HEADER {
                    return Err(CrawlError::MappingTable(format!(
                        "line {line_no}: expected header {}",
                        HEADER.join("\\t")
                    )));
                }
                seen_header = true;
                continue;
            }
            table.insert(
                MappingRow {
                    raw_ja: collapse_whitespace(fields[0]),
                    raw_en: collapse_whitespace(fields[1]),
                    norm_ja: collapse_whitespace(fields[2]),
                    norm_en: collapse_whitespace(fields[3]),
                },
                line_no,
            )?;
        }
        if !seen_header {
            return Err(CrawlError::MappingTable("missing header".to_string()));
        }
        Ok(table)
    }

    fn insert(&mut self, row: MappingRow, line_no: usize) -> Result<(), CrawlError> {
        insert_unique(&mut self.ja, &row.raw_ja, &row.norm_ja, line_no)?;
        insert_unique(&mut self.en, &row.raw_en, &row.norm_en, line_no)?;
        insert_unique(&mut self.ja_to_en, &row.norm_ja, &row.norm_en, line_no)?;
        self.rows.push(row);
        Ok(())
    }

    pub fn rows(&self) -> &[MappingRow] {
        &self.rows
    }

    pub fn ja_map(&self, raw_ja: &str) -> Option<&str> {
        self.ja.get(&collapse_whitespace(raw_ja)).map(String::as_str)
    }

    pub fn en_map(&self, raw_en: &str) -> Option<&str> {
        self.en.get(&collapse_whitespace(raw_en)).map(String::as_str)
    }

    pub fn norm_ja_to_en(&self, norm_ja: &str) -> Option<&str> {
        self.ja_to_en
            .get(&collapse_whitespace(norm_ja))
            .map(String::as_str)
    }

    /// Canonical English key for a header seen on a page of `lang`. Japanese
    /// pages sometimes carry English headers, so the other map is tried too.
    /// Unknown headers come back as their trimmed raw text.
    pub fn canonical_key(&self, raw: &str, lang: Lang) -> String {
        let from_ja = || {
            self.ja_map(raw)
                .map(|norm| self.norm_ja_to_en(norm).unwrap_or(norm))
        };
        let found = match lang {
            Lang::Ja => from_ja().or_else(|| self.en_map(raw)),
            Lang::En => self.en_map(raw).or_else(from_ja),
        };
        match found {
            Some(key) => key.to_string(),
            None => {
                let key = collapse_whitespace(raw);
                tracing::debug!(header = %key, lang = %lang, "unmapped molecular-data header");
                key
            }
        }
    }
}

fn insert_unique(
    map: &mut HashMap<String, String>,
    key: &str,
    value: &str,
    line_no: usize,
) -> Result<(), CrawlError> {
    match map.get(key) {
        Some(existing) if existing != value => Err(CrawlError::MappingTable(format!(
            "line {line_no}: {key:?} maps to both {existing:?} and {value:?}"
        ))),
        Some(_) => Ok(()),
        None => {
            map.insert(key.to_string(), value.to_string());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn bundled_table_round_trips() {
        let table = MappingTable::bundled().unwrap();
        assert!(!table.rows().is_empty());
        for row in table.rows() {
            let via_ja = table
                .ja_map(&row.raw_ja)
                .and_then(|norm| table.norm_ja_to_en(norm));
            assert_eq!(via_ja, table.en_map(&row.raw_en), "{row:?}");
        }
    }

    #[test]
    fn canonical_keys_per_language() {
        let table = MappingTable::bundled().unwrap();
        assert_eq!(table.canonical_key("プラットフォーム", Lang::Ja), "Platform");
        assert_eq!(table.canonical_key("Platform", Lang::Ja), "Platform");
        assert_eq!(table.canonical_key("  Read   Length ", Lang::En), "Read Length");
        assert_eq!(table.canonical_key(" 謎の項目 ", Lang::Ja), "謎の項目");
    }

    #[test]
    fn malformed_tables_are_rejected() {
        assert_matches!(
            MappingTable::parse("raw_ja\traw_en\tnorm_ja\tnorm_en\na\tb\tc\n"),
            Err(CrawlError::MappingTable(_))
        );
        assert_matches!(
            MappingTable::parse("a\tb\tc\td\n"),
            Err(CrawlError::MappingTable(_))
        );
        assert_matches!(
            MappingTable::parse(
                "raw_ja\traw_en\tnorm_ja\tnorm_en\nx\tX\ty\tY\nx\tX2\tz\tZ\n"
            ),
            Err(CrawlError::MappingTable(_))
        );
    }
}
