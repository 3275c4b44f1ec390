pub mod campaign;
pub mod recommendation;
