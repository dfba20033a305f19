pub mod ballot;
pub mod candidate;
pub mod roster;
pub mod selection;
pub mod session;
pub mod storage;
pub mod table;
pub mod text;
pub mod token;
