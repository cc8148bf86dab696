pub mod auth;
pub mod classes;
pub mod core;
pub mod points;
pub mod state;
pub mod students;
pub mod theme;
pub mod undo;
