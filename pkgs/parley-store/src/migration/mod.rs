//! Sea-ORM migrations for the parley-store database schema

pub use sea_orm_migration::prelude::*;

mod m20261001_000001_create_users_table;
mod m20261001_000002_create_contacts_table;
mod m20261001_000003_create_groups_table;
mod m20261001_000004_create_messages_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20261001_000001_create_users_table::Migration),
            Box::new(m20261001_000002_create_contacts_table::Migration),
            Box::new(m20261001_000003_create_groups_table::Migration),
            Box::new(m20261001_000004_create_messages_table::Migration),
        ]
    }
}
