use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_quotes_tables::Migration),
            Box::new(m20240301_000002_create_product_conversions_table::Migration),
            Box::new(m20240301_000003_create_sales_orders_tables::Migration),
            Box::new(m20240301_000004_create_purchase_orders_tables::Migration),
            Box::new(m20240301_000005_create_inventory_levels_table::Migration),
        ]
    }
}

mod m20240301_000001_create_quotes_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000001_create_quotes_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Quotes::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Quotes::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(Quotes::QuoteNumber)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(Quotes::Status)
                                .string()
                                .not_null()
                                .default("draft"),
                        )
                        .col(ColumnDef::new(Quotes::ContactId).uuid().not_null())
                        .col(ColumnDef::new(Quotes::Currency).string().not_null())
                        .col(ColumnDef::new(Quotes::QuoteDate).date().not_null())
                        .col(ColumnDef::new(Quotes::ValidUntil).date().null())
                        .col(ColumnDef::new(Quotes::EstimatedEta).string().null())
                        .col(ColumnDef::new(Quotes::Notes).text().null())
                        .col(ColumnDef::new(Quotes::RejectionReason).text().null())
                        .col(
                            ColumnDef::new(Quotes::SubtotalAmount)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Quotes::DiscountAmount)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Quotes::TaxAmount)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Quotes::TotalAmount)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Quotes::ItemsCount)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Quotes::TotalQuantity)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        // Unique so one sales order can never back two quotes.
                        .col(ColumnDef::new(Quotes::SalesOrderId).uuid().null().unique_key())
                        .col(ColumnDef::new(Quotes::PurchaseOrderId).uuid().null())
                        .col(
                            ColumnDef::new(Quotes::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(Quotes::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Quotes::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Quotes::SentAt).timestamp_with_time_zone().null())
                        .col(
                            ColumnDef::new(Quotes::AcceptedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Quotes::RejectedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Quotes::ConvertedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_quotes_status_contact")
                        .table(Quotes::Table)
                        .col(Quotes::Status)
                        .col(Quotes::ContactId)
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(QuoteLineItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(QuoteLineItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(QuoteLineItems::QuoteId).uuid().not_null())
                        .col(ColumnDef::new(QuoteLineItems::ProductId).uuid().not_null())
                        .col(ColumnDef::new(QuoteLineItems::Description).string().null())
                        .col(ColumnDef::new(QuoteLineItems::Quantity).decimal().not_null())
                        .col(ColumnDef::new(QuoteLineItems::UnitPrice).decimal().not_null())
                        .col(
                            ColumnDef::new(QuoteLineItems::DiscountAmount)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(QuoteLineItems::TaxAmount)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(QuoteLineItems::LineTotal).decimal().not_null())
                        .col(ColumnDef::new(QuoteLineItems::Position).integer().not_null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_quote_line_items_quote")
                                .from(QuoteLineItems::Table, QuoteLineItems::QuoteId)
                                .to(Quotes::Table, Quotes::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_quote_line_items_quote_id")
                        .table(QuoteLineItems::Table)
                        .col(QuoteLineItems::QuoteId)
                        .if_not_exists()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(QuoteLineItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Quotes::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Quotes {
        Table,
        Id,
        QuoteNumber,
        Status,
        ContactId,
        Currency,
        QuoteDate,
        ValidUntil,
        EstimatedEta,
        Notes,
        RejectionReason,
        SubtotalAmount,
        DiscountAmount,
        TaxAmount,
        TotalAmount,
        ItemsCount,
        TotalQuantity,
        SalesOrderId,
        PurchaseOrderId,
        Version,
        CreatedAt,
        UpdatedAt,
        SentAt,
        AcceptedAt,
        RejectedAt,
        ConvertedAt,
    }

    #[derive(DeriveIden)]
    enum QuoteLineItems {
        Table,
        Id,
        QuoteId,
        ProductId,
        Description,
        Quantity,
        UnitPrice,
        DiscountAmount,
        TaxAmount,
        LineTotal,
        Position,
    }
}

mod m20240301_000002_create_product_conversions_table {
    use sea_orm_migration::prelude::*;
    use sea_orm_migration::sea_orm::ConnectionTrait;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000002_create_product_conversions_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(ProductConversions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ProductConversions::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProductConversions::SourceProductId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProductConversions::DestinationProductId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProductConversions::ConversionFactor)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProductConversions::WastePercentage)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(ProductConversions::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(ProductConversions::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProductConversions::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // At most one active conversion per ordered (source, destination) pair.
            // Partial indexes are not expressible through the index builder.
            manager
                .get_connection()
                .execute_unprepared(
                    "CREATE UNIQUE INDEX IF NOT EXISTS idx_product_conversions_active_pair \
                     ON product_conversions (source_product_id, destination_product_id) \
                     WHERE is_active",
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ProductConversions::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum ProductConversions {
        Table,
        Id,
        SourceProductId,
        DestinationProductId,
        ConversionFactor,
        WastePercentage,
        IsActive,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000003_create_sales_orders_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000003_create_sales_orders_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(SalesOrders::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(SalesOrders::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(SalesOrders::OrderNumber)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(SalesOrders::QuoteId).uuid().not_null())
                        .col(ColumnDef::new(SalesOrders::ContactId).uuid().not_null())
                        .col(ColumnDef::new(SalesOrders::Currency).string().not_null())
                        .col(ColumnDef::new(SalesOrders::Status).string().not_null())
                        .col(
                            ColumnDef::new(SalesOrders::TotalAmount)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(SalesOrders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SalesOrders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(SalesOrderLines::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(SalesOrderLines::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(SalesOrderLines::SalesOrderId).uuid().not_null())
                        .col(ColumnDef::new(SalesOrderLines::LineNumber).integer().not_null())
                        .col(ColumnDef::new(SalesOrderLines::ProductId).uuid().not_null())
                        .col(ColumnDef::new(SalesOrderLines::Quantity).decimal().not_null())
                        .col(ColumnDef::new(SalesOrderLines::UnitPrice).decimal().not_null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_sales_order_lines_order")
                                .from(SalesOrderLines::Table, SalesOrderLines::SalesOrderId)
                                .to(SalesOrders::Table, SalesOrders::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(SalesOrderLines::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(SalesOrders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum SalesOrders {
        Table,
        Id,
        OrderNumber,
        QuoteId,
        ContactId,
        Currency,
        Status,
        TotalAmount,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum SalesOrderLines {
        Table,
        Id,
        SalesOrderId,
        LineNumber,
        ProductId,
        Quantity,
        UnitPrice,
    }
}

mod m20240301_000004_create_purchase_orders_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000004_create_purchase_orders_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(PurchaseOrders::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PurchaseOrders::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::PoNumber)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(PurchaseOrders::QuoteId).uuid().null())
                        .col(ColumnDef::new(PurchaseOrders::Currency).string().not_null())
                        .col(ColumnDef::new(PurchaseOrders::Status).string().not_null())
                        .col(
                            ColumnDef::new(PurchaseOrders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(PurchaseOrderLines::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PurchaseOrderLines::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderLines::PurchaseOrderId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderLines::LineNumber)
                                .integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PurchaseOrderLines::ProductId).uuid().not_null())
                        .col(
                            ColumnDef::new(PurchaseOrderLines::Quantity)
                                .decimal()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_purchase_order_lines_order")
                                .from(
                                    PurchaseOrderLines::Table,
                                    PurchaseOrderLines::PurchaseOrderId,
                                )
                                .to(PurchaseOrders::Table, PurchaseOrders::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PurchaseOrderLines::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(PurchaseOrders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum PurchaseOrders {
        Table,
        Id,
        PoNumber,
        QuoteId,
        Currency,
        Status,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum PurchaseOrderLines {
        Table,
        Id,
        PurchaseOrderId,
        LineNumber,
        ProductId,
        Quantity,
    }
}

mod m20240301_000005_create_inventory_levels_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000005_create_inventory_levels_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(InventoryLevels::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(InventoryLevels::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(InventoryLevels::ProductId).uuid().not_null())
                        .col(ColumnDef::new(InventoryLevels::LocationId).uuid().not_null())
                        .col(
                            ColumnDef::new(InventoryLevels::AvailableQuantity)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(InventoryLevels::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_inventory_levels_product_location")
                        .table(InventoryLevels::Table)
                        .col(InventoryLevels::ProductId)
                        .col(InventoryLevels::LocationId)
                        .unique()
                        .if_not_exists()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(InventoryLevels::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum InventoryLevels {
        Table,
        Id,
        ProductId,
        LocationId,
        AvailableQuantity,
        UpdatedAt,
    }
}
