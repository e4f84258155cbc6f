pub mod clean;
pub mod evaluate;
pub mod extract;
pub mod status;
