pub mod category;
pub mod comment;
pub mod notification;
pub mod recipe;
pub mod user;
