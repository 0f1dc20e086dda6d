//! Create conversation table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Conversation::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Conversation::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Conversation::User1Id).string_len(32).not_null())
                    .col(ColumnDef::new(Conversation::User2Id).string_len(32).not_null())
                    .col(
                        ColumnDef::new(Conversation::DeletedBy)
                            .json_binary()
                            .not_null()
                            .default(Expr::cust("'[]'::jsonb")),
                    )
                    .col(
                        ColumnDef::new(Conversation::LastMessage)
                            .text()
                            .not_null()
                            .default("No messages yet"),
                    )
                    .col(ColumnDef::new(Conversation::LastMessageAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Conversation::User1Unread)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Conversation::User2Unread)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Conversation::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_conversation_user1")
                            .from(Conversation::Table, Conversation::User1Id)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_conversation_user2")
                            .from(Conversation::Table, Conversation::User2Id)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_conversation_user1_id")
                    .table(Conversation::Table)
                    .col(Conversation::User1Id)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_conversation_user2_id")
                    .table(Conversation::Table)
                    .col(Conversation::User2Id)
                    .to_owned(),
            )
            .await?;

        // At most one conversation per unordered pair
        manager
            .get_connection()
            .execute_unprepared(
                r"
                CREATE UNIQUE INDEX IF NOT EXISTS idx_conversation_pair
                ON conversation (LEAST(user1_id, user2_id), GREATEST(user1_id, user2_id));
                ",
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Conversation::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Conversation {
    Table,
    Id,
    User1Id,
    User2Id,
    DeletedBy,
    LastMessage,
    LastMessageAt,
    User1Unread,
    User2Unread,
    CreatedAt,
}

#[derive(Iden)]
enum User {
    Table,
    Id,
}
