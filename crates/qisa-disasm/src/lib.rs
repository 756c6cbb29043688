pub mod analyze;
pub mod model;

pub use analyze::{analyze, Block, EdgeKind, EdgeOut, ErrorOut, LabelKV, Report};
pub use model::{load_raw_bin, Image};
