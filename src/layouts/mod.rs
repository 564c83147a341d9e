pub mod force_directed;
pub mod placement;

mod layout;
pub use layout::{Layout, LayoutState};
