use equity_valuation_core::statements::{FinancialStatementRow, FinancialStatements};
use tracing::debug;

use crate::input::{file, stdin};

/// Load a statement table from `--statements <file>` (`.json` or `.csv`) or,
/// without a path, from JSON piped on stdin.
pub fn load_statements(path: Option<&str>) -> Result<FinancialStatements, Box<dyn std::error::Error>> {
    let statements = match path {
        Some(path) => match file::extension(path).as_deref() {
            Some("csv") => {
                let (canonical, contents) = file::read_text(path)?;
                parse_csv(&contents)
                    .map_err(|e| format!("Failed to parse '{}': {}", canonical.display(), e))?
            }
            _ => file::read_json(path)?,
        },
        None => stdin::read_stdin()?
            .ok_or("--statements <file> or a JSON statement table on stdin is required")?,
    };
    debug!(periods = statements.len(), "statement table loaded");
    Ok(statements)
}

/// One row per period, one column per line item. Empty cells are missing
/// values; unknown columns are ignored.
fn parse_csv(contents: &str) -> Result<FinancialStatements, Box<dyn std::error::Error>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(contents.as_bytes());
    let rows = reader
        .deserialize::<FinancialStatementRow>()
        .collect::<Result<Vec<_>, _>>()?;
    Ok(FinancialStatements::new(rows)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Write;

    const CSV: &str = "\
date,totalrevenue,ebitda,ebit,netincome,totaldebt,unrelated
2023-12-31,1000,250,200,120,400,x
2022-12-31,900,225,180,,400,y
";

    #[test]
    fn test_csv_with_provider_columns() {
        let table = parse_csv(CSV).unwrap();
        assert_eq!(table.len(), 2);
        // Sorted by period, latest last
        assert_eq!(table.latest().revenue, Some(dec!(1000)));
        assert_eq!(table.rows()[0].net_income, None);
        assert_eq!(table.rows()[0].total_debt, Some(dec!(400)));
    }

    #[test]
    fn test_duplicate_period_rejected() {
        let csv = "date,totalrevenue\n2023-12-31,1\n2023-12-31,2\n";
        assert!(parse_csv(csv).is_err());
    }

    #[test]
    fn test_load_csv_and_json_files() {
        let mut csv_file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        csv_file.write_all(CSV.as_bytes()).unwrap();
        let table = load_statements(csv_file.path().to_str()).unwrap();
        assert_eq!(table.len(), 2);

        let mut json_file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            json_file,
            r#"[{{"period_end": "2023-12-31", "revenue": "1000", "ebitda": "250"}}]"#
        )
        .unwrap();
        let table = load_statements(json_file.path().to_str()).unwrap();
        assert_eq!(table.latest().ebitda, Some(dec!(250)));
    }
}
