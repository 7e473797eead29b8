mod database {
    pub mod actions;
    pub mod draft;
    pub mod error;
    pub mod export;
    pub mod form;
    pub mod pagination;
    pub mod schema;
}
mod authentication {
    pub mod jwt;
    pub mod middleware;
    pub mod permissions;
}
pub mod config;
mod constants;

mod media {
    pub mod image;
}

mod cache {
    pub mod cache;
}

pub use authentication::*;
pub use cache::cache::*;
pub use constants::*;
pub use database::*;
pub use media::*;
