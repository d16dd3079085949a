//! Loading the list of companies to research.

use anyhow::{Context, bail};
use std::{collections::HashSet, path::Path};

const HEADER_NAMES: &[&str] = &["company", "company_name", "name"];

/// Read company names from a newline-delimited or CSV file.
///
/// Only the first column is used. Blank lines, `#` comments, a header row and
/// duplicates are skipped.
pub fn load_companies(path: impl AsRef<Path>) -> anyhow::Result<Vec<String>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read company list {}", path.display()))?;
    let companies = parse_companies(&text)
        .with_context(|| format!("failed to parse company list {}", path.display()))?;
    if companies.is_empty() {
        bail!("no companies found in {}", path.display());
    }
    Ok(companies)
}

/// Parse company names from the first CSV column.
///
/// The header, if any, must be the first data row; comment and blank lines
/// before it do not count.
pub fn parse_companies(text: &str) -> anyhow::Result<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    let mut first_row = true;

    for record in reader.records() {
        let record = record.context("malformed company list")?;
        let name = record.get(0).unwrap_or_default();
        if name.is_empty() || name.starts_with('#') {
            continue;
        }
        let is_header = first_row && HEADER_NAMES.contains(&name.to_lowercase().as_str());
        first_row = false;
        if is_header {
            continue;
        }
        if seen.insert(name.to_string()) {
            out.push(name.to_string());
        }
    }
    Ok(out)
}
