pub mod comment;
pub mod follow;
pub mod group;
pub mod post;
pub mod session;
pub mod user;

pub use comment::Entity as Comment;
pub use follow::Entity as Follow;
pub use group::Entity as Group;
pub use post::Entity as Post;
pub use session::Entity as Session;
pub use user::Entity as User;
