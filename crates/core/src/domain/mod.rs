pub mod conversation;
pub mod decision;
