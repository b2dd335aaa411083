pub mod icons;
pub mod output;
pub mod table;
pub mod theme;

pub use icons::Icons;
pub use output::{error, header, info, section, success, summary_row, warn};
pub use table::{TableBuilder, contexts_table, predicates_table, stats_table};
pub use theme::{theme, Theme};
