pub mod estimate;
pub mod fees;
pub mod transaction;
pub mod validation;
pub mod view;
