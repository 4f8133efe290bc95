// src/company.rs
use crate::utils::error::StorageError;
use csv::StringRecord;
use std::io::{Read, Write};
use std::path::Path;

const CID_COLUMN: &str = "CID";
const NAME_COLUMN: &str = "CompanyName";
const IR_URL_COLUMN: &str = "investor_relations_url";
const VALIDATED_COLUMN: &str = "validated";

/// One row of the company master.
#[derive(Debug, Clone, PartialEq)]
pub struct Company {
    pub cid: String,
    pub name: String,
    pub ir_url: Option<String>,
    /// The IR URL has been confirmed by a person.
    pub validated: bool,
}

/// Tab-separated company reference table. Rows are kept as raw records so
/// columns this tool does not know about survive a rewrite.
#[derive(Debug, Clone)]
pub struct CompanyMaster {
    headers: StringRecord,
    rows: Vec<StringRecord>,
}

impl CompanyMaster {
    /// Loads the master table from a TSV file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        let master = Self::from_reader(file, &path.display().to_string())?;
        tracing::info!("Loaded {} companies from {}", master.rows.len(), path.display());
        Ok(master)
    }

    /// Parses a master table from any reader. `source` only labels errors.
    pub fn from_reader<R: Read>(reader: R, source: &str) -> Result<Self, StorageError> {
        let mut tsv = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .flexible(true)
            .from_reader(reader);
        let headers = tsv.headers()?.clone();

        for required in [CID_COLUMN, NAME_COLUMN] {
            if !headers.iter().any(|h| h == required) {
                return Err(StorageError::MissingColumn {
                    column: required.to_string(),
                    path: source.to_string(),
                });
            }
        }

        let mut rows = Vec::new();
        for record in tsv.records() {
            let record = record?;
            if record.iter().all(|field| field.trim().is_empty()) {
                continue;
            }
            rows.push(record);
        }
        Ok(Self { headers, rows })
    }

    fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    fn field(&self, row: &StringRecord, column: &str) -> Option<String> {
        self.column(column)
            .and_then(|idx| row.get(idx))
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn to_company(&self, row: &StringRecord) -> Company {
        Company {
            cid: self.field(row, CID_COLUMN).unwrap_or_default(),
            name: self.field(row, NAME_COLUMN).unwrap_or_default(),
            ir_url: self.field(row, IR_URL_COLUMN),
            validated: self
                .field(row, VALIDATED_COLUMN)
                .map(|v| parse_flag(&v))
                .unwrap_or(false),
        }
    }

    /// All companies in table order.
    pub fn companies(&self) -> Vec<Company> {
        self.rows.iter().map(|row| self.to_company(row)).collect()
    }

    pub fn find(&self, cid: &str) -> Option<Company> {
        self.rows
            .iter()
            .map(|row| self.to_company(row))
            .find(|company| company.cid == cid)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Sets the IR URL for a company, adding the column when the table has
    /// none. Returns false when the CID is unknown.
    pub fn set_ir_url(&mut self, cid: &str, url: &str) -> bool {
        let ir_idx = match self.column(IR_URL_COLUMN) {
            Some(idx) => idx,
            None => {
                self.headers.push_field(IR_URL_COLUMN);
                self.headers.len() - 1
            }
        };
        let Some(cid_idx) = self.column(CID_COLUMN) else {
            return false;
        };
        let width = self.headers.len();

        let mut updated = false;
        for row in self.rows.iter_mut() {
            if row.get(cid_idx).map(str::trim) != Some(cid) {
                continue;
            }
            let mut fields: Vec<String> = row.iter().map(str::to_string).collect();
            fields.resize(width, String::new());
            fields[ir_idx] = url.to_string();
            *row = StringRecord::from(fields);
            updated = true;
        }
        updated
    }

    /// Writes the table back as TSV.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), StorageError> {
        let path = path.as_ref();
        let file = std::fs::File::create(path)?;
        self.write_to(file)?;
        tracing::info!("Saved company master to {}", path.display());
        Ok(())
    }

    pub fn write_to<W: Write>(&self, writer: W) -> Result<(), StorageError> {
        let mut tsv = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .flexible(true)
            .from_writer(writer);
        tsv.write_record(&self.headers)?;
        for row in &self.rows {
            tsv.write_record(row)?;
        }
        tsv.flush()?;
        Ok(())
    }
}

/// Interprets spreadsheet-style truthy values.
pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "true" | "1" | "yes" | "y" | "x"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "CID\tCompanyName\tinvestor_relations_url\tvalidated\tCCY\tISIN\tSector\n\
S1\tABB Ltd\thttps://global.abb/group/en/investors\tTrue\tSEK\tCH0012221716\tIndustrials\n\
S2\tAlfa Laval AB\t\tFalse\tSEK\tSE0000695876\tIndustrials\n";

    #[test]
    fn test_parse_companies() {
        let master = CompanyMaster::from_reader(SAMPLE.as_bytes(), "sample").unwrap();
        let companies = master.companies();
        assert_eq!(companies.len(), 2);
        assert_eq!(companies[0].cid, "S1");
        assert_eq!(companies[0].ir_url.as_deref(), Some("https://global.abb/group/en/investors"));
        assert!(companies[0].validated);
        assert_eq!(companies[1].ir_url, None, "empty cell means no IR URL");
        assert!(!companies[1].validated);
    }

    #[test]
    fn test_missing_required_column() {
        let err = CompanyMaster::from_reader("Name\tURL\nx\ty\n".as_bytes(), "bad.tsv").unwrap_err();
        assert!(matches!(err, StorageError::MissingColumn { ref column, .. } if column == "CID"));
    }

    #[test]
    fn test_set_ir_url_keeps_unknown_columns() {
        let mut master = CompanyMaster::from_reader(SAMPLE.as_bytes(), "sample").unwrap();
        assert!(master.set_ir_url("S2", "https://www.alfalaval.com/investors/"));
        assert!(!master.set_ir_url("S9", "https://example.com"));

        let mut out = Vec::new();
        master.write_to(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("S2\tAlfa Laval AB\thttps://www.alfalaval.com/investors/\tFalse"));
        assert!(text.lines().next().unwrap().ends_with("Sector"));

        let reloaded = CompanyMaster::from_reader(text.as_bytes(), "out").unwrap();
        assert_eq!(
            reloaded.find("S2").and_then(|c| c.ir_url).as_deref(),
            Some("https://www.alfalaval.com/investors/")
        );
    }

    #[test]
    fn test_set_ir_url_adds_column() {
        let mut master = CompanyMaster::from_reader("CID\tCompanyName\nS1\tVolvo\n".as_bytes(), "t").unwrap();
        assert!(master.set_ir_url("S1", "https://www.volvogroup.com/en/investors.html"));
        let company = master.find("S1").unwrap();
        assert_eq!(company.ir_url.as_deref(), Some("https://www.volvogroup.com/en/investors.html"));
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("TRUE"));
        assert!(parse_flag(" yes "));
        assert!(parse_flag("1"));
        assert!(!parse_flag("False"));
        assert!(!parse_flag(""));
    }
}
