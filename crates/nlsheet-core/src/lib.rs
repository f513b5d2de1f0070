//! # nlsheet-core
//!
//! Core data structures shared by the nlsheet crates:
//! - [`CellError`] - typed spreadsheet error values (`#DIV/0!`, `#VALUE!`, ...)
//! - [`CellAddress`] and [`CellRange`] - A1-style cell addressing
//!
//! ## Example
//!
//! ```rust
//! use nlsheet_core::{CellAddress, CellError, CellRange};
//!
//! let addr = CellAddress::parse("B2").unwrap();
//! assert_eq!((addr.row, addr.col), (1, 1));
//!
//! let range = CellRange::parse("A1:B2").unwrap();
//! assert_eq!(range.cell_count(), 4);
//!
//! assert_eq!(CellError::from_str("#DIV/0!"), Some(CellError::Div0));
//! ```

pub mod address;
pub mod cell_error;
pub mod error;

pub use address::{CellAddress, CellRange, CellRangeIterator};
pub use cell_error::CellError;
pub use error::{Error, Result};

/// Maximum number of rows addressable with A1 notation (Excel limit)
pub const MAX_ROWS: u32 = 1_048_576;

/// Maximum number of columns addressable with A1 notation (Excel limit)
pub const MAX_COLS: u16 = 16_384;
