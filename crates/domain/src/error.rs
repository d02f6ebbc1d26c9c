//! Domain error types.

use std::collections::BTreeMap;

use serde::Serialize;
use store::{OrderStatus, ProductId, StoreError};
use thiserror::Error;

/// Validation messages keyed by field path (`shipping.email`, `items.0.quantity`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors {
    fields: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// A single message on a single field.
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.fields
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.fields.get(field).map(Vec::as_slice)
    }

    pub fn fields(&self) -> &BTreeMap<String, Vec<String>> {
        &self.fields
    }

    /// First message in field order, used as the summary line.
    pub fn first_message(&self) -> Option<&str> {
        self.fields
            .values()
            .flat_map(|messages| messages.first())
            .map(String::as_str)
            .next()
    }

    /// `Ok(())` when nothing was collected.
    pub fn into_result(self) -> Result<(), DomainError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(DomainError::Validation(self))
        }
    }
}

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A cart line referenced a product id that doesn't exist.
    #[error("Product not found: {product_id}")]
    ItemNotFound { product_id: ProductId },

    /// The product is inactive or holds less than the requested quantity.
    #[error("{product_name} is out of stock or has insufficient quantity.")]
    InsufficientStock {
        product_id: ProductId,
        product_name: String,
        requested: u32,
    },

    /// The request failed field validation.
    #[error("{}", .0.first_message().unwrap_or("The given data was invalid."))]
    Validation(ValidationErrors),

    /// The record doesn't exist or the viewer may not see it.
    #[error("{resource} not found")]
    NotFound { resource: &'static str },

    #[error("Cannot change order status from {from} to {to}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },

    /// The store failed for a reason the caller can't fix.
    #[error("Persistence failure: {0}")]
    Persistence(StoreError),
}

impl DomainError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        DomainError::Validation(ValidationErrors::single(field, message))
    }

    pub fn order_not_found() -> Self {
        DomainError::NotFound { resource: "Order" }
    }

    pub fn product_not_found() -> Self {
        DomainError::NotFound { resource: "Product" }
    }

    pub fn category_not_found() -> Self {
        DomainError::NotFound { resource: "Category" }
    }

    /// Short label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            DomainError::ItemNotFound { .. } => "item_not_found",
            DomainError::InsufficientStock { .. } => "insufficient_stock",
            DomainError::Validation(_) => "validation",
            DomainError::NotFound { .. } => "not_found",
            DomainError::InvalidStatusTransition { .. } => "invalid_transition",
            DomainError::Persistence(_) => "persistence",
        }
    }
}

impl From<StoreError> for DomainError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::InsufficientStock {
                product_id,
                requested,
            } => DomainError::InsufficientStock {
                product_id,
                product_name: format!("Product {product_id}"),
                requested,
            },
            StoreError::DuplicateSku(_) => {
                DomainError::validation("sku", "The sku has already been taken.")
            }
            StoreError::DuplicateSlug(_) => {
                DomainError::validation("name", "The name has already been taken.")
            }
            other => DomainError::Persistence(other),
        }
    }
}
