pub mod groups;
pub mod media;
pub mod posts;
pub mod profiles;
pub mod users;
