mod edge;

pub use self::edge::{EdgeCurve, SLOPE_EPSILON};
