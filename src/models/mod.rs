pub mod actor;
pub mod attempt;
pub mod attempt_question;
pub mod module;
pub mod question;
pub mod signoff;
pub mod xp_event;
