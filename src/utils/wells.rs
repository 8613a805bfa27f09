use anyhow::{Result, bail};

pub const PLATE_ROWS: [char; 8] = ['A', 'B', 'C', 'D', 'E', 'F', 'G', 'H'];
pub const PLATE_COLUMNS: usize = 12;
pub const PLATE_WELLS: usize = PLATE_ROWS.len() * PLATE_COLUMNS;

/// 96-well plate addresses in column-major order: A1, B1, ..., H1, A2, ..., H12.
pub fn generate_columnwise_wells() -> Vec<String> {
    (1..=PLATE_COLUMNS)
        .flat_map(|column| PLATE_ROWS.iter().map(move |row| format!("{row}{column}")))
        .collect()
}

/// Hands out the wells of one fresh plate in order and refuses to wrap around once all 96
/// are taken.
#[derive(Debug)]
pub struct WellCursor {
    plate: String,
    wells: Vec<String>,
    index: usize,
}

impl WellCursor {
    pub fn new(plate: &str) -> Self {
        WellCursor {
            plate: plate.to_string(),
            wells: generate_columnwise_wells(),
            index: 0,
        }
    }

    pub fn next_well(&mut self) -> Result<String> {
        let Some(well) = self.wells.get(self.index) else {
            bail!(
                "Not enough wells on plate {:?}: all {} wells are already in use",
                self.plate,
                self.wells.len()
            );
        };
        self.index += 1;
        Ok(well.clone())
    }

    pub fn used(&self) -> usize {
        self.index
    }
}
