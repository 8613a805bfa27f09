use anyhow::{Context, Result, anyhow};
use std::path::Path;

pub const WELL_COLUMN: &str = "Well Position";
pub const NMOLES_COLUMN: &str = "nmoles";

/// Columns that may carry the primer identifier, in order of preference.
pub const NAME_COLUMNS: [&str; 3] = ["Sequence Name", "Name", "Sequence identifier"];

/// Vendor bookkeeping columns that are of no use to the liquid handler.
pub const VENDOR_COLUMNS: [&str; 9] = [
    "Payment Method",
    "Plate Barcode",
    "Sales Order #",
    "Reference #",
    "Measured Concentration uM",
    "Final Volume L",
    "Extinction Coefficient L/(mole·cm)",
    "Tm",
    "Well Barcode",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentOrientation {
    Forward,
    Reverse,
}

impl FragmentOrientation {
    pub fn token(&self) -> &'static str {
        match self {
            FragmentOrientation::Forward => "Fw_Frag_gg_",
            FragmentOrientation::Reverse => "Rv_Frag_gg_",
        }
    }
}

/// A primer as the planners need it: where it sits and how much of it there is.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimerRecord {
    pub name: String,
    pub well: String,
    pub nmoles: f64,
}

/// Rows of an imported plate sheet, accessed by column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlateTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl PlateTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        PlateTable { headers, rows }
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.headers.iter().position(|header| header == column)
    }

    pub fn name_column(&self) -> Result<usize> {
        NAME_COLUMNS
            .iter()
            .find_map(|column| self.column_index(column))
            .with_context(|| {
                format!(
                    "None of the identifier columns {:?} is present in the plate (columns: {:?})",
                    NAME_COLUMNS, self.headers
                )
            })
    }

    fn required_column(&self, column: &str) -> Result<usize> {
        self.column_index(column)
            .ok_or_else(|| anyhow!("Column {:?} is missing from the plate", column))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Keeps the rows for which `predicate` holds on the value of `column`.
    pub fn select<F>(&self, column: usize, predicate: F) -> PlateTable
    where
        F: Fn(&str) -> bool,
    {
        let rows = self
            .rows
            .iter()
            .filter(|row| row.get(column).is_some_and(|value| predicate(value)))
            .cloned()
            .collect();
        PlateTable::new(self.headers.clone(), rows)
    }

    /// Removes the named columns. Names that are not present are ignored.
    pub fn drop_columns(&self, columns: &[&str]) -> PlateTable {
        let keep: Vec<usize> = (0..self.headers.len())
            .filter(|&idx| !columns.contains(&self.headers[idx].as_str()))
            .collect();

        let project = |values: &Vec<String>| -> Vec<String> {
            keep.iter()
                .map(|&idx| values.get(idx).cloned().unwrap_or_default())
                .collect()
        };

        PlateTable::new(project(&self.headers), self.rows.iter().map(project).collect())
    }

    /// Appends the rows of `other`, matching its columns up by name.
    pub fn concat(&self, other: &PlateTable) -> PlateTable {
        let mut headers = self.headers.clone();
        for header in &other.headers {
            if !headers.contains(header) {
                headers.push(header.clone());
            }
        }

        let realign = |table: &PlateTable| -> Vec<Vec<String>> {
            let positions: Vec<Option<usize>> =
                headers.iter().map(|header| table.column_index(header)).collect();
            table
                .rows
                .iter()
                .map(|row| {
                    positions
                        .iter()
                        .map(|pos| pos.and_then(|idx| row.get(idx).cloned()).unwrap_or_default())
                        .collect()
                })
                .collect()
        };

        let mut rows = realign(self);
        rows.extend(realign(other));
        PlateTable::new(headers, rows)
    }

    /// Extracts name, well and nmoles from every row. Rows with an unreadable nmoles value are
    /// logged and skipped.
    pub fn primer_records(&self) -> Result<Vec<PrimerRecord>> {
        let name_idx = self.name_column()?;
        let well_idx = self.required_column(WELL_COLUMN)?;
        let nmoles_idx = self.required_column(NMOLES_COLUMN)?;

        let mut records = Vec::with_capacity(self.rows.len());
        for (row_number, row) in self.rows.iter().enumerate() {
            let name = row.get(name_idx).cloned().unwrap_or_default();
            let raw_nmoles = row.get(nmoles_idx).map(String::as_str).unwrap_or("");
            match raw_nmoles.trim().parse::<f64>() {
                Ok(nmoles) if nmoles.is_finite() && nmoles >= 0.0 => records.push(PrimerRecord {
                    name,
                    well: row.get(well_idx).cloned().unwrap_or_default(),
                    nmoles,
                }),
                _ => log::warn!(
                    "Skipping row {} ({:?}): cannot use nmoles value {:?}",
                    row_number + 1,
                    name,
                    raw_nmoles
                ),
            }
        }
        Ok(records)
    }
}

/// Turns `A01`..`H09` into `A1`..`H9`. Anything else is returned unchanged.
pub fn clean_well_position(well: &str) -> String {
    match well.as_bytes() {
        [row @ b'A'..=b'H', b'0', digit @ b'1'..=b'9'] => {
            format!("{}{}", *row as char, *digit as char)
        }
        _ => well.to_string(),
    }
}

/// Reads a vendor plate sheet. Well positions are normalized on the way in.
pub fn load_plate(plate_file: &Path) -> Result<PlateTable> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(plate_file)
        .with_context(|| format!("Could not open plate file {:?}", plate_file))?;

    let headers: Vec<String> = reader
        .headers()
        .with_context(|| format!("Could not read the header of {:?}", plate_file))?
        .iter()
        .map(|header| header.trim().to_string())
        .collect();
    let well_idx = headers.iter().position(|header| header == WELL_COLUMN);

    let mut rows = Vec::new();
    for (row_number, result) in reader.records().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(err) => {
                log::warn!("Skipping malformed row {} in {:?}: {}", row_number + 1, plate_file, err);
                continue;
            }
        };
        let mut row: Vec<String> = record.iter().map(str::to_string).collect();
        row.resize(headers.len(), String::new());
        if let Some(idx) = well_idx {
            row[idx] = clean_well_position(&row[idx]);
        }
        rows.push(row);
    }

    Ok(PlateTable::new(headers, rows))
}

/// Keeps the fragment primers of one orientation and strips the vendor columns.
pub fn filter_fragment_primers(
    plate: &PlateTable,
    orientation: FragmentOrientation,
) -> Result<PlateTable> {
    let name_idx = plate.name_column()?;
    let token = orientation.token();

    Ok(plate
        .select(name_idx, |name| name.contains(token))
        .drop_columns(&VENDOR_COLUMNS))
}
