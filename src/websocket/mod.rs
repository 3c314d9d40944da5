pub mod entities;
pub mod tournaments;
