// Business logic services

pub mod profile_service;
pub mod exercise_service;
pub mod routine_service;
pub mod relationship_service;
pub mod assignment_service;

pub use profile_service::ProfileService;
pub use exercise_service::ExerciseService;
pub use routine_service::RoutineService;
pub use relationship_service::RelationshipService;
pub use assignment_service::AssignmentService;
