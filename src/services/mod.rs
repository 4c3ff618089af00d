pub mod attempt_service;
pub mod events;
pub mod grading_service;
pub mod selection_service;
pub mod xp_service;
