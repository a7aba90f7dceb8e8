use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
enum Contacts {
    Table,
    OwnerId,
    ContactId,
    Nickname,
    Blocked,
    CreatedAt,
}

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m20261001_000002_create_contacts_table"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Contacts::Table)
                    .col(ColumnDef::new(Contacts::OwnerId).string().not_null())
                    .col(ColumnDef::new(Contacts::ContactId).string().not_null())
                    .col(ColumnDef::new(Contacts::Nickname).string())
                    .col(
                        ColumnDef::new(Contacts::Blocked)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Contacts::CreatedAt).big_integer().not_null())
                    .primary_key(
                        Index::create()
                            .col(Contacts::OwnerId)
                            .col(Contacts::ContactId),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_contacts_contact")
                    .table(Contacts::Table)
                    .col(Contacts::ContactId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Contacts::Table).to_owned())
            .await
    }
}
