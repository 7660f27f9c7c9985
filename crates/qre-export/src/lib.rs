pub mod optimization;
pub mod symbol;
pub mod trades;
pub mod wfa;
pub mod zip_bundle;

pub use optimization::{write_optimization_csv, OptunaMetadata};
pub use symbol::{extract_file_prefix, extract_symbol_from_csv_filename, generate_wfa_output_filename};
pub use trades::{write_trades_csv, write_wfa_trades_csv};
pub use wfa::write_wfa_csv;
pub use zip_bundle::write_trades_zip;
