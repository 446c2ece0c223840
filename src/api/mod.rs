// API routes and handlers

pub mod exercises;
pub mod health;
pub mod profiles;
pub mod relationships;
pub mod routes;
pub mod routines;
