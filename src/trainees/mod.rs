pub mod certificates;
pub mod models;
pub mod views;
