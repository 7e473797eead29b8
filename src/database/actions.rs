mod catalog;
mod media;
mod membership;
mod recipes;
mod shopping_list;
mod subscriptions;
mod users;

pub use catalog::*;
pub use membership::*;
pub use recipes::*;
pub use shopping_list::*;
pub use subscriptions::*;
pub use users::*;
