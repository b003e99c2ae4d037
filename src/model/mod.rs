pub mod issue;
pub mod mapping;
