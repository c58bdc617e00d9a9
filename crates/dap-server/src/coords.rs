/// Conversion between the runtime's 0-based lines/columns and the front end's convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Coordinates {
    pub lines_start_at1: bool,
    pub columns_start_at1: bool,
}

impl Default for Coordinates {
    fn default() -> Self {
        Self {
            lines_start_at1: true,
            columns_start_at1: true,
        }
    }
}

impl Coordinates {
    pub fn to_client_line(self, line: usize) -> i64 {
        line as i64 + i64::from(self.lines_start_at1)
    }

    /// Client line to runtime line; values before the first line clamp to 0.
    pub fn from_client_line(self, line: i64) -> usize {
        usize::try_from(line - i64::from(self.lines_start_at1)).unwrap_or(0)
    }

    pub fn to_client_column(self, column: usize) -> i64 {
        column as i64 + i64::from(self.columns_start_at1)
    }

    pub fn from_client_column(self, column: i64) -> usize {
        usize::try_from(column - i64::from(self.columns_start_at1)).unwrap_or(0)
    }
}
