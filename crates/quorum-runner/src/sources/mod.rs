//! File-backed collaborators: observation feeds written by external
//! collectors and the portfolio of record.

pub mod file;
pub mod portfolio;

pub use file::JsonFileSource;
pub use portfolio::LedgerPortfolio;
