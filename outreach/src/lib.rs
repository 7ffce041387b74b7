//! Campaign orchestration and the operator-facing surface.

pub mod approval;
pub mod campaign;
