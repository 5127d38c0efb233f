pub mod rules;
pub mod smoke;
pub mod validator;

pub use smoke::{SmokeCheck, SmokeTest};
pub use validator::{RuleOutcome, Validator};
