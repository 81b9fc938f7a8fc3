//! Reads a character-delimited tabular source into materialized [`Row`]s,
//! applying the header/skip/delimiter/projection/filter/rename passes in the
//! order spec.md §4.1/§6 describes.
use std::path::Path;

use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::filter::Filter;
use crate::row::Row;
use crate::value::Value;

const DELIMITER_CANDIDATES: [u8; 4] = [b',', b'\t', b'|', b';'];

/// Read `config.file` and return the fully materialized rows, in source
/// order. Never fails solely because a filter expression didn't parse, or
/// because the column-rename map references a column that wasn't present
/// (both degrade silently, logging a warning) — see §4.1.4 and §7.
pub fn load_rows(config: &ProviderConfig) -> Result<Vec<Row>, ProviderError> {
    let raw = read_source_text(&config.file)?;

    let delimiter = config
        .delimiter
        .map(|c| c as u8)
        .unwrap_or_else(|| detect_delimiter(&raw));

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(raw.as_bytes());

    let mut records: Vec<csv::StringRecord> = reader
        .records()
        .filter_map(|r| r.ok())
        .filter(|r| !(config.skip_empty_lines && is_blank(r)))
        .collect();

    // Header row (default on, always the first remaining record): parsed
    // before `skip_first_line` is applied, per §4.1's pass order.
    let header: Vec<String> = if let Some(first) = records.first() {
        first.iter().map(str::to_string).collect()
    } else {
        Vec::new()
    };
    if !records.is_empty() {
        records.remove(0);
    }

    // `skip_first_line` drops the row immediately following the header —
    // distinct from (and applied after) header-mode parsing.
    if config.skip_first_line && !records.is_empty() {
        records.remove(0);
    }

    let filter = config.filter.as_deref().and_then(Filter::parse);

    let mut rows = Vec::with_capacity(records.len());
    for record in &records {
        let pairs = header
            .iter()
            .enumerate()
            .map(|(i, col)| {
                let raw = record.get(i).unwrap_or("");
                (col.clone(), Value::coerce(raw))
            })
            .collect::<Vec<_>>();
        let mut row = Row::from_pairs(pairs);

        if let Some(cols) = &config.columns {
            row = row.project(cols);
        }
        if let Some(filter) = &filter {
            if !filter.matches(&row) {
                continue;
            }
        }
        if !config.column_rename.is_empty() {
            row = row.rename(&config.column_rename);
        }
        rows.push(row);
    }

    if rows.is_empty() {
        return Err(ProviderError::NoData {
            path: config.file.clone(),
        });
    }

    Ok(rows)
}

fn read_source_text(path: &Path) -> Result<String, ProviderError> {
    std::fs::read(path)
        .map_err(|source| ProviderError::SourceMissing {
            path: path.to_path_buf(),
            source,
        })
        .map(|bytes| {
            let (text, _, had_errors) = encoding_rs::UTF_8.decode(&bytes);
            if had_errors {
                tracing::warn!(path = %path.display(), "source contained invalid UTF-8; lossily decoded");
            }
            text.into_owned()
        })
}

fn is_blank(record: &csv::StringRecord) -> bool {
    record.iter().all(|f| f.trim().is_empty())
}

/// Count occurrences of each delimiter candidate on the first non-empty
/// line and pick the most frequent; ties favor the candidate earlier in
/// `DELIMITER_CANDIDATES` (comma first, per §6).
fn detect_delimiter(text: &str) -> u8 {
    let first_line = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    DELIMITER_CANDIDATES
        .iter()
        .copied()
        .max_by_key(|d| first_line.bytes().filter(|b| b == d).count())
        .unwrap_or(b',')
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use std::io::Write;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    fn config_for(path: &Path) -> ProviderConfig {
        ProviderConfig {
            file: path.to_path_buf(),
            encoding: None,
            delimiter: None,
            skip_first_line: false,
            skip_empty_lines: true,
            columns: None,
            filter: None,
            column_rename: IndexMap::new(),
            distribution: None,
            change_policy: None,
            mode: None,
            randomize: false,
            cycle_on_exhaustion: true,
        }
    }

    #[test]
    fn loads_rows_with_header_and_type_coercion() {
        let f = write_temp("name,age,active\nAlice,30,true\nBob,25,false\n");
        let rows = load_rows(&config_for(f.path())).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("name"), Some(&Value::Text("Alice".into())));
        assert_eq!(rows[0].get("age"), Some(&Value::Int(30)));
        assert_eq!(rows[0].get("active"), Some(&Value::Bool(true)));
    }

    #[test]
    fn auto_detects_pipe_delimiter() {
        let f = write_temp("name|age\nAlice|30\nBob|25\n");
        let rows = load_rows(&config_for(f.path())).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("age"), Some(&Value::Int(30)));
    }

    #[test]
    fn skips_empty_lines_by_default() {
        let f = write_temp("name,age\nAlice,30\n\nBob,25\n");
        let rows = load_rows(&config_for(f.path())).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn skip_first_line_drops_the_row_after_the_header_not_the_header_itself() {
        let f = write_temp("name,age\nAlice,30\nBob,25\nCarol,40\n");
        let mut cfg = config_for(f.path());
        cfg.skip_first_line = true;
        let rows = load_rows(&cfg).unwrap();
        // The header (`name,age`) still names the columns; `Alice,30`, the
        // row right after it, is the one dropped.
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("name"), Some(&Value::Text("Bob".into())));
        assert_eq!(rows[0].get("age"), Some(&Value::Int(25)));
        assert_eq!(rows[1].get("name"), Some(&Value::Text("Carol".into())));
    }

    #[test]
    fn missing_source_is_source_missing_error() {
        let result = load_rows(&config_for(Path::new(
            "/nonexistent/path/does-not-exist.csv",
        )));
        assert!(matches!(result, Err(ProviderError::SourceMissing { .. })));
    }

    #[test]
    fn empty_after_filter_is_no_data_error() {
        let f = write_temp("name,age\nAlice,30\nBob,25\n");
        let mut cfg = config_for(f.path());
        cfg.filter = Some("age > 100".to_string());
        let result = load_rows(&cfg);
        assert!(matches!(result, Err(ProviderError::NoData { .. })));
    }

    #[test]
    fn projection_and_rename_apply_in_order() {
        let f = write_temp("name,age,city\nAlice,30,Boston\n");
        let mut cfg = config_for(f.path());
        cfg.columns = Some(vec!["city".into(), "name".into()]);
        cfg.column_rename.insert("city".into(), "town".into());
        let rows = load_rows(&cfg).unwrap();
        assert_eq!(rows[0].columns().collect::<Vec<_>>(), vec!["town", "name"]);
    }
}
