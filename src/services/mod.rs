pub mod calculator;
pub mod collaborators;
pub mod ethereum;
pub mod fee_input;
pub mod reconciler;
pub mod registry;
pub mod session;
pub mod submission;
pub mod validator;
