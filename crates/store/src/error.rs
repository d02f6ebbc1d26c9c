use thiserror::Error;

use crate::ProductId;

/// Errors that can occur when reading or writing storefront records.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A guarded stock decrement found less stock than requested, or the
    /// product was inactive or gone. The surrounding transaction is rolled back.
    #[error("Insufficient stock for product {product_id}: requested {requested}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
    },

    /// The order number is already taken.
    #[error("Duplicate order number: {0}")]
    DuplicateOrderNumber(String),

    /// Another product already uses this SKU.
    #[error("Duplicate SKU: {0}")]
    DuplicateSku(String),

    /// Another product or category already uses this slug.
    #[error("Duplicate slug: {0}")]
    DuplicateSlug(String),

    /// The backend refused the write for a reason other than the above.
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
