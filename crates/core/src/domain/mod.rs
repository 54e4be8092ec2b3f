pub mod association;
pub mod contact;
pub mod deal;
pub mod page;
