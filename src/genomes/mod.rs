pub mod magnet_order;

pub use magnet_order::{MagnetOrdering, MagnetSet, MagnetSorter};
