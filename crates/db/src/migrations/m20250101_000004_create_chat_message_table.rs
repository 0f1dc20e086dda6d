//! Create `chat_message` table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ChatMessage::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ChatMessage::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ChatMessage::ConversationId)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(ColumnDef::new(ChatMessage::SenderId).string_len(32).not_null())
                    .col(
                        ColumnDef::new(ChatMessage::Content)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(ColumnDef::new(ChatMessage::AttachmentUrl).string_len(1024))
                    .col(ColumnDef::new(ChatMessage::AttachmentKind).string_len(16))
                    .col(ColumnDef::new(ChatMessage::ThumbnailUrl).string_len(1024))
                    .col(ColumnDef::new(ChatMessage::DeletionHandle).string_len(512))
                    .col(
                        ColumnDef::new(ChatMessage::SeenBy)
                            .json_binary()
                            .not_null()
                            .default(Expr::cust("'[]'::jsonb")),
                    )
                    .col(
                        ColumnDef::new(ChatMessage::IsEdited)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(ChatMessage::IsDeleted)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(ChatMessage::ReplyToId).string_len(32))
                    .col(
                        ColumnDef::new(ChatMessage::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ChatMessage::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_chat_message_conversation")
                            .from(ChatMessage::Table, ChatMessage::ConversationId)
                            .to(Conversation::Table, Conversation::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_chat_message_reply_to")
                            .from(ChatMessage::Table, ChatMessage::ReplyToId)
                            .to(ChatMessage::Table, ChatMessage::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        // Conversation history in insertion order
        manager
            .create_index(
                Index::create()
                    .name("idx_chat_message_conversation")
                    .table(ChatMessage::Table)
                    .col(ChatMessage::ConversationId)
                    .col(ChatMessage::Id)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_chat_message_sender_id")
                    .table(ChatMessage::Table)
                    .col(ChatMessage::SenderId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ChatMessage::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum ChatMessage {
    Table,
    Id,
    ConversationId,
    SenderId,
    Content,
    AttachmentUrl,
    AttachmentKind,
    ThumbnailUrl,
    DeletionHandle,
    SeenBy,
    IsEdited,
    IsDeleted,
    ReplyToId,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum Conversation {
    Table,
    Id,
}
