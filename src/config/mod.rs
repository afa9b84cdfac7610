pub mod simulation;
pub mod terrain;
