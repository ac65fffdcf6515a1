pub mod ioe;
pub mod tsv;
pub use ioe::{read_ioe, records_from_df, EventRecord};
pub use tsv::{HeaderMode, TsvTable};
