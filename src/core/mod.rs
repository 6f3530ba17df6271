//! 核心：错误类型与路径校验

pub mod error;
pub mod validation;

pub use error::HealError;
pub use validation::PathGuard;
