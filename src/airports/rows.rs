use std::io;
use tracing::debug;

/// Column name used by older airport files for the longitude.
pub const LEGACY_LONGITUDE: &str = "long";
/// Column name the destination schema expects for the longitude.
pub const LONGITUDE: &str = "lng";

/// An in-memory table: named columns and rows of optional text cells.
/// Empty CSV fields are stored as `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowCollection {
    columns: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

impl RowCollection {
    pub fn new(columns: Vec<String>) -> Self {
        RowCollection {
            columns,
            rows: Vec::new(),
        }
    }

    /// Reads a CSV document whose first record names the columns.
    pub fn from_csv<R: io::Read>(reader: R) -> Result<Self, csv::Error> {
        let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);
        let columns = reader.headers()?.iter().map(str::to_owned).collect();
        let mut collection = RowCollection::new(columns);
        for record in reader.records() {
            let record = record?;
            collection.rows.push(
                record
                    .iter()
                    .map(|field| if field.is_empty() { None } else { Some(field.to_owned()) })
                    .collect(),
            );
        }
        Ok(collection)
    }

    /// Appends a row. Rows whose width doesn't match the columns are refused.
    #[cfg(test)]
    pub(crate) fn push(&mut self, row: Vec<Option<String>>) -> bool {
        if row.len() != self.columns.len() {
            return false;
        }
        self.rows.push(row);
        true
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Option<String>]> + '_ {
        self.rows.iter().map(Vec::as_slice)
    }

    #[cfg(test)]
    pub(crate) fn value(&self, row: usize, column: &str) -> Option<&str> {
        let index = self.column_index(column)?;
        self.rows.get(row)?.get(index)?.as_deref()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Renames every column called `from`. Returns whether anything changed.
    pub fn rename_column(&mut self, from: &str, to: &str) -> bool {
        let mut renamed = false;
        for column in self.columns.iter_mut().filter(|column| column.as_str() == from) {
            *column = to.to_owned();
            renamed = true;
        }
        renamed
    }

    /// Brings legacy column names in line with the destination schema.
    pub fn normalize_columns(&mut self) {
        if self.rename_column(LEGACY_LONGITUDE, LONGITUDE) {
            debug!("renamed column `{}` to `{}`", LEGACY_LONGITUDE, LONGITUDE);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const CSV: &str = "\
iata,name,city,state,country,lat,long
00M,Thigpen ,Bay Springs,MS,USA,31.95376472,-89.23450472
00R,Livingston Municipal,Livingston,TX,USA,30.68586111,-95.01792778
00V,Meadow Lake,,CO,USA,38.94574889,-104.5698933
";

    #[test]
    fn reads_csv_with_header() -> Result<(), csv::Error> {
        let rows = RowCollection::from_csv(CSV.as_bytes())?;
        assert_eq!(rows.len(), 3);
        assert_eq!(rows.columns()[0], "iata");
        assert_eq!(rows.value(0, "name"), Some("Thigpen "));
        assert_eq!(rows.value(2, "city"), None);
        assert_eq!(rows.value(1, "long"), Some("-95.01792778"));
        Ok(())
    }

    #[test]
    fn header_only_is_empty() -> Result<(), csv::Error> {
        let rows = RowCollection::from_csv("iata,name\n".as_bytes())?;
        assert!(rows.is_empty());
        assert_eq!(rows.columns().len(), 2);
        Ok(())
    }

    #[test]
    fn ragged_rows_are_errors() {
        assert!(RowCollection::from_csv("iata,name\nJFK\n".as_bytes()).is_err());
    }

    #[test]
    fn longitude_is_renamed() -> Result<(), csv::Error> {
        let mut rows = RowCollection::from_csv(CSV.as_bytes())?;
        rows.normalize_columns();
        assert_eq!(rows.column_index(LEGACY_LONGITUDE), None);
        assert_eq!(rows.column_index(LONGITUDE), Some(6));
        assert_eq!(rows.value(0, LONGITUDE), Some("-89.23450472"));
        Ok(())
    }

    #[test]
    fn push_checks_width() {
        let mut rows = RowCollection::new(vec![String::from("iata"), String::from("name")]);
        assert!(!rows.push(vec![Some(String::from("JFK"))]));
        assert!(rows.push(vec![Some(String::from("JFK")), None]));
        assert_eq!(rows.len(), 1);
    }

    fn column_names() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec(prop_oneof![Just(String::from("long")), "[a-z_]{1,8}"], 0..8)
    }

    proptest! {
        #[test]
        fn no_legacy_longitude_survives(columns in column_names()) {
            let mut rows = RowCollection::new(columns.clone());
            rows.normalize_columns();

            prop_assert!(rows.column_index(LEGACY_LONGITUDE).is_none());
            prop_assert_eq!(rows.columns().len(), columns.len());
            for (before, after) in columns.iter().zip(rows.columns()) {
                if before == LEGACY_LONGITUDE {
                    prop_assert_eq!(after, LONGITUDE);
                } else {
                    prop_assert_eq!(after, before);
                }
            }
        }

        #[test]
        fn collections_without_legacy_longitude_are_unchanged(
            columns in prop::collection::vec("[a-z_]{1,8}", 0..8)
        ) {
            prop_assume!(!columns.iter().any(|c| c == LEGACY_LONGITUDE));
            let mut rows = RowCollection::new(columns);
            let before = rows.clone();
            rows.normalize_columns();
            prop_assert_eq!(rows, before);
        }
    }
}
