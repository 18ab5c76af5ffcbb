pub mod logs;
pub mod places;
pub mod replay;
