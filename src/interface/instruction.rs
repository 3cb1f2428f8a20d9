use serde::{Deserialize, Serialize};
use std::fmt;

use super::transport::Color;

/// Rows in the largest supported key matrix.
pub const MAX_ROWS: usize = 7;
/// Columns in the largest supported key matrix.
pub const MAX_COLS: usize = 24;

/// Sequence id handed out when an instruction is enqueued.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstructionId(pub u64);

impl fmt::Display for InstructionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Row-major per-key color matrix. `colors` always holds exactly
/// `rows * cols` entries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawColorGrid")]
pub struct ColorGrid {
    rows: usize,
    cols: usize,
    colors: Vec<Color>,
}

#[derive(Deserialize)]
struct RawColorGrid {
    rows: usize,
    cols: usize,
    colors: Vec<Color>,
}

impl TryFrom<RawColorGrid> for ColorGrid {
    type Error = String;

    fn try_from(raw: RawColorGrid) -> Result<Self, Self::Error> {
        match raw.rows.checked_mul(raw.cols) {
            Some(len) if len == raw.colors.len() => Ok(Self {
                rows: raw.rows,
                cols: raw.cols,
                colors: raw.colors,
            }),
            _ => Err(format!(
                "grid of {}x{} needs {} colors, got {}",
                raw.rows,
                raw.cols,
                raw.rows.saturating_mul(raw.cols),
                raw.colors.len()
            )),
        }
    }
}

impl ColorGrid {
    /// A `rows x cols` grid filled with `fill`, or `None` if the size
    /// overflows.
    pub fn new(rows: usize, cols: usize, fill: Color) -> Option<Self> {
        let len = rows.checked_mul(cols)?;
        Some(Self {
            rows,
            cols,
            colors: vec![fill; len],
        })
    }

    /// A `MAX_ROWS x MAX_COLS` grid with every key set to `fill`.
    pub fn full_size(fill: Color) -> Self {
        Self {
            rows: MAX_ROWS,
            cols: MAX_COLS,
            colors: vec![fill; MAX_ROWS * MAX_COLS],
        }
    }

    /// Build from nested rows. Returns `None` unless every row has the same
    /// length.
    pub fn from_rows(rows: Vec<Vec<Color>>) -> Option<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|r| r.len() != cols) {
            return None;
        }
        let n_rows = rows.len();
        Some(Self {
            rows: n_rows,
            cols,
            colors: rows.into_iter().flatten().collect(),
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, row: usize, col: usize) -> Option<Color> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        self.colors.get(row * self.cols + col).copied()
    }

    /// Returns `false` if (row, col) is outside the grid.
    pub fn set(&mut self, row: usize, col: usize, color: Color) -> bool {
        if row >= self.rows || col >= self.cols {
            return false;
        }
        match self.colors.get_mut(row * self.cols + col) {
            Some(slot) => {
                *slot = color;
                true
            }
            None => false,
        }
    }

    pub fn as_slice(&self) -> &[Color] {
        &self.colors
    }

    /// Iterate rows as slices, top to bottom.
    pub fn iter_rows(&self) -> impl Iterator<Item = &[Color]> {
        // chunks(0) panics; an empty grid yields no rows either way.
        self.colors.chunks(self.cols.max(1))
    }

    /// Flatten into wire order: r, g, b per key, row-major.
    pub fn to_rgb_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.colors.len() * 3);
        for c in &self.colors {
            out.push(c.r);
            out.push(c.g);
            out.push(c.b);
        }
        out
    }
}

/// One unit of work for the controller's worker.
///
/// Owned by the queue once enqueued and never modified afterwards: it is
/// either executed and dropped, or cancelled and dropped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Instruction {
    /// Send a no-op control packet.
    Idle,
    /// Set every LED to one color.
    Uniform { color: Color },
    /// Set every LED from a per-key grid.
    Grid { grid: ColorGrid },
}

impl Instruction {
    pub fn idle() -> Self {
        Instruction::Idle
    }

    pub fn uniform(color: Color) -> Self {
        Instruction::Uniform { color }
    }

    pub fn grid(grid: ColorGrid) -> Self {
        Instruction::Grid { grid }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Instruction::Idle => "idle",
            Instruction::Uniform { .. } => "uniform",
            Instruction::Grid { .. } => "grid",
        }
    }
}
