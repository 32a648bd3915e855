#![allow(elided_lifetimes_in_paths)]

use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_restaurant_tables::Migration),
            Box::new(m20240101_000002_create_orders_table::Migration),
            Box::new(m20240101_000003_create_order_items_table::Migration),
            Box::new(m20240101_000004_create_notifications_table::Migration),
            Box::new(m20240101_000005_create_settlement_events_table::Migration),
        ]
    }
}

mod m20240101_000001_create_restaurant_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_restaurant_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Restaurants::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Restaurants::Id)
                                .big_integer()
                                .auto_increment()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Restaurants::Name).string().not_null())
                        .col(
                            ColumnDef::new(Restaurants::Slug)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(Restaurants::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Restaurants::TaxPercentage)
                                .decimal_len(5, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Restaurants::ContactPhone).string().not_null())
                        .col(ColumnDef::new(Restaurants::ContactEmail).string().not_null())
                        .col(ColumnDef::new(Restaurants::BankAccountNumber).string().null())
                        .col(ColumnDef::new(Restaurants::BankIfsc).string().null())
                        .col(ColumnDef::new(Restaurants::VendorId).string().null())
                        .col(
                            ColumnDef::new(Restaurants::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Restaurants::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(DiningTables::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(DiningTables::Id)
                                .big_integer()
                                .auto_increment()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DiningTables::RestaurantId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(DiningTables::TableNumber).string().not_null())
                        .col(
                            ColumnDef::new(DiningTables::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(MenuItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(MenuItems::Id)
                                .big_integer()
                                .auto_increment()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(MenuItems::RestaurantId).big_integer().not_null())
                        .col(ColumnDef::new(MenuItems::Name).string().not_null())
                        .col(
                            ColumnDef::new(MenuItems::Price)
                                .decimal_len(12, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(MenuItems::IsAvailable)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(MenuItems::InventoryCount)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(MenuItems::LowStockThreshold)
                                .integer()
                                .not_null()
                                .default(5),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_menu_items_restaurant_id")
                        .table(MenuItems::Table)
                        .col(MenuItems::RestaurantId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(PromoCodes::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PromoCodes::Id)
                                .big_integer()
                                .auto_increment()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PromoCodes::RestaurantId).big_integer().not_null())
                        .col(ColumnDef::new(PromoCodes::Code).string().not_null())
                        .col(
                            ColumnDef::new(PromoCodes::DiscountPercentage)
                                .decimal_len(5, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PromoCodes::MinOrderAmount)
                                .decimal_len(12, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(PromoCodes::MaxUses).integer().null())
                        .col(
                            ColumnDef::new(PromoCodes::UsedCount)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(PromoCodes::ValidFrom)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PromoCodes::ValidUntil)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PromoCodes::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_promo_codes_restaurant_id")
                        .table(PromoCodes::Table)
                        .col(PromoCodes::RestaurantId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PromoCodes::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(MenuItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(DiningTables::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Restaurants::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub enum Restaurants {
        Table,
        Id,
        Name,
        Slug,
        IsActive,
        TaxPercentage,
        ContactPhone,
        ContactEmail,
        BankAccountNumber,
        BankIfsc,
        VendorId,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub enum DiningTables {
        Table,
        Id,
        RestaurantId,
        TableNumber,
        IsActive,
    }

    #[derive(DeriveIden)]
    pub enum MenuItems {
        Table,
        Id,
        RestaurantId,
        Name,
        Price,
        IsAvailable,
        InventoryCount,
        LowStockThreshold,
    }

    #[derive(DeriveIden)]
    pub enum PromoCodes {
        Table,
        Id,
        RestaurantId,
        Code,
        DiscountPercentage,
        MinOrderAmount,
        MaxUses,
        UsedCount,
        ValidFrom,
        ValidUntil,
        IsActive,
    }
}

mod m20240101_000002_create_orders_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_orders_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Orders::Id)
                                .big_integer()
                                .auto_increment()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Orders::RestaurantId).big_integer().not_null())
                        .col(ColumnDef::new(Orders::OrderNumber).string().not_null())
                        .col(ColumnDef::new(Orders::TableId).big_integer().not_null())
                        .col(ColumnDef::new(Orders::TableNumber).string().not_null())
                        .col(ColumnDef::new(Orders::CustomerPhone).string().null())
                        .col(ColumnDef::new(Orders::CustomerEmail).string().null())
                        .col(ColumnDef::new(Orders::OrderedBy).string().null())
                        .col(ColumnDef::new(Orders::CaptainId).big_integer().null())
                        .col(ColumnDef::new(Orders::Subtotal).decimal_len(12, 2).not_null())
                        .col(
                            ColumnDef::new(Orders::Discount)
                                .decimal_len(12, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Orders::PromoCode).string().null())
                        .col(
                            ColumnDef::new(Orders::TaxPercentage)
                                .decimal_len(5, 2)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Orders::TaxAmount).decimal_len(12, 2).not_null())
                        .col(
                            ColumnDef::new(Orders::TotalAmount)
                                .decimal_len(12, 2)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Orders::Status).string().not_null())
                        .col(ColumnDef::new(Orders::PaymentMethod).string().not_null())
                        .col(ColumnDef::new(Orders::PaymentStatus).string().not_null())
                        .col(ColumnDef::new(Orders::TransactionId).string().null())
                        .col(ColumnDef::new(Orders::GatewayOrderId).string().null())
                        .col(
                            ColumnDef::new(Orders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // Order numbers are unique within a restaurant and never reused.
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_orders_restaurant_order_number")
                        .table(Orders::Table)
                        .col(Orders::RestaurantId)
                        .col(Orders::OrderNumber)
                        .unique()
                        .to_owned(),
                )
                .await?;

            // Webhooks resolve orders through this correlation column.
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_gateway_order_id")
                        .table(Orders::Table)
                        .col(Orders::GatewayOrderId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_restaurant_status")
                        .table(Orders::Table)
                        .col(Orders::RestaurantId)
                        .col(Orders::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_created_at")
                        .table(Orders::Table)
                        .col(Orders::CreatedAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub enum Orders {
        Table,
        Id,
        RestaurantId,
        OrderNumber,
        TableId,
        TableNumber,
        CustomerPhone,
        CustomerEmail,
        OrderedBy,
        CaptainId,
        Subtotal,
        Discount,
        PromoCode,
        TaxPercentage,
        TaxAmount,
        TotalAmount,
        Status,
        PaymentMethod,
        PaymentStatus,
        TransactionId,
        GatewayOrderId,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000003_create_order_items_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_order_items_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(OrderItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderItems::Id)
                                .big_integer()
                                .auto_increment()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderItems::OrderId).big_integer().not_null())
                        .col(ColumnDef::new(OrderItems::MenuItemId).big_integer().not_null())
                        .col(ColumnDef::new(OrderItems::Name).string().not_null())
                        .col(ColumnDef::new(OrderItems::Quantity).integer().not_null())
                        .col(
                            ColumnDef::new(OrderItems::UnitPrice)
                                .decimal_len(12, 2)
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderItems::SpecialInstructions).string().null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_items_order_id")
                        .table(OrderItems::Table)
                        .col(OrderItems::OrderId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OrderItems::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub enum OrderItems {
        Table,
        Id,
        OrderId,
        MenuItemId,
        Name,
        Quantity,
        UnitPrice,
        SpecialInstructions,
    }
}

mod m20240101_000004_create_notifications_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_notifications_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Notifications::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Notifications::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Notifications::RestaurantId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Notifications::Kind).string().not_null())
                        .col(ColumnDef::new(Notifications::Message).string().not_null())
                        .col(ColumnDef::new(Notifications::MenuItemId).big_integer().null())
                        .col(
                            ColumnDef::new(Notifications::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_notifications_restaurant_kind")
                        .table(Notifications::Table)
                        .col(Notifications::RestaurantId)
                        .col(Notifications::Kind)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Notifications::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub enum Notifications {
        Table,
        Id,
        RestaurantId,
        Kind,
        Message,
        MenuItemId,
        CreatedAt,
    }
}

mod m20240101_000005_create_settlement_events_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000005_create_settlement_events_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(SettlementEvents::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(SettlementEvents::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(SettlementEvents::EventType).string().not_null())
                        .col(ColumnDef::new(SettlementEvents::VendorId).string().null())
                        .col(ColumnDef::new(SettlementEvents::SettlementId).string().null())
                        .col(ColumnDef::new(SettlementEvents::Amount).decimal_len(12, 2).null())
                        .col(ColumnDef::new(SettlementEvents::Payload).text().not_null())
                        .col(
                            ColumnDef::new(SettlementEvents::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_settlement_events_vendor_id")
                        .table(SettlementEvents::Table)
                        .col(SettlementEvents::VendorId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(SettlementEvents::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub enum SettlementEvents {
        Table,
        Id,
        EventType,
        VendorId,
        SettlementId,
        Amount,
        Payload,
        CreatedAt,
    }
}
