pub mod auth;
pub mod categories;
pub mod engagement;
pub mod error;
pub mod notifications;
pub mod ownership;
pub mod recipes;
pub mod social;
pub mod uploads;
pub mod users;
