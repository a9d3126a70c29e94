pub mod hierarchy;
pub mod relative_start;
pub mod value_row;
