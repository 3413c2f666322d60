//! Grid snapshots: a 9×9 sudoku board.
//!
//! [`SudokuState`] is a fixed-size grid of cell values where `0` means empty
//! and `1..=9` are placed digits. Cells are write-once: a placement into a
//! filled cell is rejected.
//!
//! # Merge policy
//!
//! Cell-wise, with empty acting as the identity:
//!
//! | left | right | result |
//! |------|-------|--------|
//! | empty | empty | empty |
//! | empty | `v` | `v` |
//! | `v` | empty | `v` |
//! | `v` | `v` | `v` |
//! | `a` | `b` (`a != b`) | `b` (right wins) |
//!
//! The last row is last-writer-wins and breaks commutativity. Replicas in the
//! demo fill disjoint cells so it never triggers there; when it does,
//! [`Mergeable::reconcile`] reports each overwritten cell as a
//! [`CellConflict`].

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::mergeable::{Mergeable, Reconciled};

/// Side length of the board.
pub const SIZE: usize = 9;

/// Side length of one sub-block.
pub const BLOCK: usize = 3;

/// The value of an empty cell.
pub const EMPTY: u8 = 0;

/// Largest digit a cell may hold.
pub const MAX_VALUE: u8 = 9;

/// Number of cells on the board.
const CELLS: usize = SIZE * SIZE;

/// Raw board layout, row-major.
pub type Board = [[u8; SIZE]; SIZE];

/// Why a placement was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PlacementError {
    /// Row or column is outside the board.
    #[error("cell ({row}, {col}) is outside the 9x9 board")]
    OutOfBounds {
        /// Requested row.
        row: usize,
        /// Requested column.
        col: usize,
    },

    /// The digit is outside `1..=9`.
    #[error("value {value} is not a digit between 1 and 9")]
    InvalidValue {
        /// Requested value.
        value: u8,
    },

    /// The cell already holds a digit.
    #[error("cell ({row}, {col}) already holds {current}")]
    CellOccupied {
        /// Requested row.
        row: usize,
        /// Requested column.
        col: usize,
        /// The digit already in the cell.
        current: u8,
    },
}

/// A board that holds a value outside `0..=9`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cell ({row}, {col}) holds {value}, expected 0..=9")]
pub struct InvalidCell {
    /// Row of the bad cell.
    pub row: usize,
    /// Column of the bad cell.
    pub col: usize,
    /// The out-of-domain value.
    pub value: u8,
}

/// Two boards disagreed on a filled cell; `right` was kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellConflict {
    /// Row of the cell.
    pub row: usize,
    /// Column of the cell.
    pub col: usize,
    /// The left operand's digit (discarded).
    pub left: u8,
    /// The right operand's digit (kept).
    pub right: u8,
}

#[derive(Deserialize)]
struct RawSudoku {
    board: Board,
}

impl TryFrom<RawSudoku> for SudokuState {
    type Error = InvalidCell;

    fn try_from(raw: RawSudoku) -> Result<Self, Self::Error> {
        Self::from_board(raw.board)
    }
}

/// Immutable snapshot of a sudoku board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "RawSudoku")]
pub struct SudokuState {
    board: Board,
}

impl SudokuState {
    /// An empty board.
    pub const fn new() -> Self {
        Self {
            board: [[EMPTY; SIZE]; SIZE],
        }
    }

    /// Wrap a raw board after checking every cell is in `0..=9`.
    pub fn from_board(board: Board) -> Result<Self, InvalidCell> {
        for (row, cells) in board.iter().enumerate() {
            for (col, &value) in cells.iter().enumerate() {
                if value > MAX_VALUE {
                    return Err(InvalidCell { row, col, value });
                }
            }
        }
        Ok(Self { board })
    }

    /// Return a board with `value` at (`row`, `col`), or the reason it was
    /// rejected.
    pub fn try_place(&self, row: usize, col: usize, value: u8) -> Result<Self, PlacementError> {
        if row >= SIZE || col >= SIZE {
            return Err(PlacementError::OutOfBounds { row, col });
        }
        if !(1..=MAX_VALUE).contains(&value) {
            return Err(PlacementError::InvalidValue { value });
        }

        let mut board = self.board;
        let cell = board
            .get_mut(row)
            .and_then(|cells| cells.get_mut(col))
            .ok_or(PlacementError::OutOfBounds { row, col })?;
        if *cell != EMPTY {
            return Err(PlacementError::CellOccupied {
                row,
                col,
                current: *cell,
            });
        }
        *cell = value;

        Ok(Self { board })
    }

    /// Return a board with `value` at (`row`, `col`).
    ///
    /// Out-of-bounds coordinates, values outside `1..=9` and filled cells
    /// all yield an unchanged copy of `self`.
    #[must_use]
    pub fn place(&self, row: usize, col: usize, value: u8) -> Self {
        self.try_place(row, col, value).unwrap_or(*self)
    }

    /// The digit at (`row`, `col`), `Some(0)` if empty, `None` if out of
    /// bounds.
    pub fn cell(&self, row: usize, col: usize) -> Option<u8> {
        self.board.get(row).and_then(|cells| cells.get(col)).copied()
    }

    /// The raw grid.
    pub const fn board(&self) -> &Board {
        &self.board
    }

    /// Number of non-empty cells.
    pub fn count_filled(&self) -> usize {
        self.board.iter().flatten().filter(|&&v| v != EMPTY).count()
    }

    /// No digit repeats within any row, column or 3×3 block.
    pub fn is_valid(&self) -> bool {
        let rows_ok = self.board.iter().all(|cells| distinct_digits(cells.iter().copied()));
        let cols_ok = (0..SIZE).all(|col| distinct_digits(self.column(col)));
        let blocks_ok = (0..BLOCK)
            .flat_map(|band| (0..BLOCK).map(move |stack| (band, stack)))
            .all(|(band, stack)| distinct_digits(self.block(band, stack)));
        rows_ok && cols_ok && blocks_ok
    }

    /// Valid and completely filled.
    pub fn is_solved(&self) -> bool {
        self.count_filled() == CELLS && self.is_valid()
    }

    fn column(&self, col: usize) -> impl Iterator<Item = u8> + '_ {
        self.board.iter().filter_map(move |cells| cells.get(col).copied())
    }

    fn block(&self, band: usize, stack: usize) -> impl Iterator<Item = u8> + '_ {
        let first_row = band.saturating_mul(BLOCK);
        let first_col = stack.saturating_mul(BLOCK);
        self.board
            .iter()
            .skip(first_row)
            .take(BLOCK)
            .flat_map(move |cells| cells.iter().skip(first_col).take(BLOCK).copied())
    }
}

fn distinct_digits(values: impl Iterator<Item = u8>) -> bool {
    let mut seen = [false; 10];
    for value in values.filter(|&v| v != EMPTY) {
        match seen.get_mut(usize::from(value)) {
            Some(slot) if *slot => return false,
            Some(slot) => *slot = true,
            None => return false,
        }
    }
    true
}

impl Mergeable for SudokuState {
    type Conflict = CellConflict;

    fn reconcile(&self, other: &Self) -> Reconciled<Self, CellConflict> {
        let mut board = [[EMPTY; SIZE]; SIZE];
        let mut conflicts = Vec::new();

        let rows = board.iter_mut().zip(&self.board).zip(&other.board);
        for (row, ((out, left_cells), right_cells)) in rows.enumerate() {
            let cells = out.iter_mut().zip(left_cells).zip(right_cells);
            for (col, ((slot, &left), &right)) in cells.enumerate() {
                *slot = match (left, right) {
                    (value, EMPTY) | (EMPTY, value) => value,
                    (l, r) if l == r => l,
                    (l, r) => {
                        conflicts.push(CellConflict {
                            row,
                            col,
                            left: l,
                            right: r,
                        });
                        r
                    }
                };
            }
        }

        Reconciled {
            merged: Self { board },
            conflicts,
        }
    }
}

impl fmt::Display for SudokuState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for cells in &self.board {
            for &value in cells {
                if value == EMPTY {
                    f.write_str(".")?;
                } else {
                    write!(f, "{value}")?;
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
