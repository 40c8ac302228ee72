pub mod form;
pub mod prompt;
