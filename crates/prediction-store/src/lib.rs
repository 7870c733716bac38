pub mod db;
mod predictions;
mod rows;
mod stocks;

pub use db::PredictionDb;
pub use predictions::SqlitePredictionRepository;
pub use stocks::SqliteStockRepository;
