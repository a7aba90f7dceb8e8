//! Sea-ORM entities for parley-store

pub mod contacts;
pub mod group_members;
pub mod groups;
pub mod messages;
pub mod users;

pub use contacts::Entity as Contacts;
pub use group_members::Entity as GroupMembers;
pub use groups::Entity as Groups;
pub use messages::Entity as Messages;
pub use users::Entity as Users;
