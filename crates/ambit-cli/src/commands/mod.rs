pub mod fork;
pub mod order;
pub mod track;
