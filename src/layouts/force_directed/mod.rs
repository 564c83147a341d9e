mod forces;
mod layout;
mod simulation;

pub use forces::{CenterForce, ChargeForce, CollideForce, Force, LinkForce};
pub use layout::{ForceDirected, ForceDirectedState};
pub use simulation::{relax_step, Body, SimGraph};
