pub mod attempt_dto;
pub mod xp_dto;
