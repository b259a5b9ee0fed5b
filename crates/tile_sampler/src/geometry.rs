pub mod footprint;
pub mod projection;

pub use footprint::{Footprint, square_footprint};
pub use projection::geodesic_circle_envelope;
