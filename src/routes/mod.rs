pub mod admin;
pub mod auth;
pub mod companies;
pub mod groups;
pub mod health;
pub mod invitations;
pub mod projects;
pub mod tasks;
