//! Order placement.
//!
//! A checkout validates the submitted cart, prices every line from the
//! stored product (client prices are never read), and hands the order plus
//! its stock decrements to the store as one atomic write. Order-number
//! collisions are retried with a fresh number.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Deserialize;
use store::{
    BillingAddress, CatalogStore, Money, NewOrder, NewOrderItem, Order, OrderStatus, OrderStore,
    OrderTotals, PaymentStatus, Product, ProductId, ShippingAddress, StockDecrement, StoreError,
    UserId,
};

use crate::error::{DomainError, ValidationErrors};
use crate::order_number::OrderNumberGenerator;
use crate::validation::{is_email, optional, required};

/// Attempts at writing an order before a number collision becomes fatal.
pub const MAX_ORDER_NUMBER_ATTEMPTS: u32 = 3;

/// Payment method recorded when the request names none.
pub const DEFAULT_PAYMENT_METHOD: &str = "pending";

const NAME_MAX: usize = 255;
const PHONE_MAX: usize = 20;
const ZIP_MAX: usize = 20;
const COUNTRY_MAX: usize = 2;
const PAYMENT_METHOD_MAX: usize = 50;
pub(crate) const NOTES_MAX: usize = 1000;

/// One submitted cart line. Any other field (such as a client-side price)
/// is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CartLineInput {
    pub id: Option<i64>,
    pub quantity: Option<i64>,
}

/// Submitted shipping address, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShippingInput {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub address_2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub country: Option<String>,
}

/// Body of a checkout request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckoutRequest {
    pub items: Option<Vec<CartLineInput>>,
    pub shipping: Option<ShippingInput>,
    /// When true, any submitted billing address is ignored.
    pub billing_same_as_shipping: Option<bool>,
    pub billing: Option<BillingAddress>,
    pub payment_method: Option<String>,
    pub notes: Option<String>,
}

/// A validated cart line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// A checkout request that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidCheckout {
    pub lines: Vec<CartLine>,
    pub shipping: ShippingAddress,
    pub billing: Option<BillingAddress>,
    pub payment_method: String,
    pub notes: Option<String>,
}

impl CheckoutRequest {
    /// Checks every field and reports all violations at once.
    pub fn validate(&self) -> Result<ValidCheckout, DomainError> {
        let mut errors = ValidationErrors::new();

        let lines = validate_lines(&mut errors, self.items.as_deref());
        let shipping = validate_shipping(&mut errors, self.shipping.as_ref());
        let billing = self
            .billing
            .as_ref()
            .filter(|_| !self.billing_same_as_shipping.unwrap_or(false))
            .map(|b| validate_billing(&mut errors, b))
            .filter(|b| !b.is_empty());
        let payment_method = optional(
            &mut errors,
            "payment_method",
            self.payment_method.as_deref(),
            PAYMENT_METHOD_MAX,
        );
        let notes = optional(&mut errors, "notes", self.notes.as_deref(), NOTES_MAX);

        errors.into_result()?;

        // Every branch that leaves these unset also recorded an error.
        let shipping = shipping.ok_or_else(|| DomainError::validation("shipping", "invalid"))?;
        Ok(ValidCheckout {
            lines,
            shipping,
            billing,
            payment_method: payment_method.unwrap_or_else(|| DEFAULT_PAYMENT_METHOD.to_string()),
            notes,
        })
    }
}

fn validate_lines(errors: &mut ValidationErrors, items: Option<&[CartLineInput]>) -> Vec<CartLine> {
    let items = match items {
        Some(items) if !items.is_empty() => items,
        Some(_) => {
            errors.add("items", "The items field must have at least 1 items.");
            return Vec::new();
        }
        None => {
            errors.add("items", "The items field is required.");
            return Vec::new();
        }
    };

    let mut lines = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let id = match item.id {
            Some(id) => Some(ProductId::new(id)),
            None => {
                let field = format!("items.{i}.id");
                errors.add(&field, format!("The {field} field is required."));
                None
            }
        };
        let quantity = match item.quantity {
            Some(q) if q >= 1 => u32::try_from(q).ok().or_else(|| {
                let field = format!("items.{i}.quantity");
                errors.add(&field, format!("The {field} field is too large."));
                None
            }),
            Some(_) => {
                let field = format!("items.{i}.quantity");
                errors.add(&field, format!("The {field} field must be at least 1."));
                None
            }
            None => {
                let field = format!("items.{i}.quantity");
                errors.add(&field, format!("The {field} field is required."));
                None
            }
        };
        if let (Some(product_id), Some(quantity)) = (id, quantity) {
            lines.push(CartLine {
                product_id,
                quantity,
            });
        }
    }
    lines
}

fn validate_shipping(
    errors: &mut ValidationErrors,
    input: Option<&ShippingInput>,
) -> Option<ShippingAddress> {
    let empty = ShippingInput::default();
    let input = input.unwrap_or(&empty);

    let first_name = required(errors, "shipping.first_name", input.first_name.as_deref(), NAME_MAX);
    let last_name = required(errors, "shipping.last_name", input.last_name.as_deref(), NAME_MAX);
    let email = required(errors, "shipping.email", input.email.as_deref(), NAME_MAX);
    let email = email.filter(|e| {
        let ok = is_email(e);
        if !ok {
            errors.add(
                "shipping.email",
                "The shipping.email field must be a valid email address.",
            );
        }
        ok
    });
    let phone = optional(errors, "shipping.phone", input.phone.as_deref(), PHONE_MAX);
    let address = required(errors, "shipping.address", input.address.as_deref(), NAME_MAX);
    let address_2 = optional(errors, "shipping.address_2", input.address_2.as_deref(), NAME_MAX);
    let city = required(errors, "shipping.city", input.city.as_deref(), NAME_MAX);
    let state = required(errors, "shipping.state", input.state.as_deref(), NAME_MAX);
    let zip = required(errors, "shipping.zip", input.zip.as_deref(), ZIP_MAX);
    let country = required(errors, "shipping.country", input.country.as_deref(), COUNTRY_MAX);

    Some(ShippingAddress {
        first_name: first_name?,
        last_name: last_name?,
        email: email?,
        phone,
        address: address?,
        address_2,
        city: city?,
        state: state?,
        zip: zip?,
        country: country?.to_ascii_uppercase(),
    })
}

fn validate_billing(errors: &mut ValidationErrors, input: &BillingAddress) -> BillingAddress {
    let mut field = |name: &str, value: &Option<String>, max: usize| {
        optional(errors, &format!("billing.{name}"), value.as_deref(), max)
    };
    BillingAddress {
        first_name: field("first_name", &input.first_name, NAME_MAX),
        last_name: field("last_name", &input.last_name, NAME_MAX),
        address: field("address", &input.address, NAME_MAX),
        address_2: field("address_2", &input.address_2, NAME_MAX),
        city: field("city", &input.city, NAME_MAX),
        state: field("state", &input.state, NAME_MAX),
        zip: field("zip", &input.zip, ZIP_MAX),
        country: field("country", &input.country, COUNTRY_MAX).map(|c| c.to_ascii_uppercase()),
    }
}

/// Line items, stock decrements and totals for a cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedCart {
    pub items: Vec<NewOrderItem>,
    pub decrements: Vec<StockDecrement>,
    pub totals: OrderTotals,
}

fn total_too_large() -> DomainError {
    DomainError::validation("items", "The order total is too large.")
}

/// Prices `lines` against the stored products.
///
/// Lines are checked in submitted order. Repeated lines for one product are
/// checked against what the earlier lines left over.
pub fn price_cart(
    lines: &[CartLine],
    products: &HashMap<ProductId, Product>,
) -> Result<PricedCart, DomainError> {
    let mut taken: HashMap<ProductId, u64> = HashMap::new();
    let mut items = Vec::with_capacity(lines.len());
    let mut decrements = Vec::with_capacity(lines.len());

    for line in lines {
        let product = products
            .get(&line.product_id)
            .ok_or(DomainError::ItemNotFound {
                product_id: line.product_id,
            })?;

        let taken = taken.entry(product.id).or_insert(0);
        let wanted = *taken + u64::from(line.quantity);
        if !product.can_fulfill(wanted) {
            return Err(DomainError::InsufficientStock {
                product_id: product.id,
                product_name: product.name.clone(),
                requested: line.quantity,
            });
        }
        *taken = wanted;

        let item = NewOrderItem::snapshot(product, line.quantity).ok_or_else(total_too_large)?;
        items.push(item);
        decrements.push(StockDecrement {
            product_id: product.id,
            quantity: line.quantity,
        });
    }

    let subtotal = items
        .iter()
        .try_fold(Money::zero(), |acc, item| acc.checked_add(item.subtotal))
        .ok_or_else(total_too_large)?;
    let totals = OrderTotals::new(subtotal, Money::zero(), Money::zero(), Money::zero());

    Ok(PricedCart {
        items,
        decrements,
        totals,
    })
}

/// Places orders against a store.
pub struct CheckoutService<S> {
    store: S,
    numbers: Arc<dyn OrderNumberGenerator>,
}

impl<S> Clone for CheckoutService<S>
where
    S: Clone,
{
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            numbers: Arc::clone(&self.numbers),
        }
    }
}

impl<S> CheckoutService<S>
where
    S: CatalogStore + OrderStore,
{
    pub fn new(store: S, numbers: Arc<dyn OrderNumberGenerator>) -> Self {
        Self { store, numbers }
    }

    /// Validates, prices and persists an order. On error nothing was written.
    #[tracing::instrument(skip(self, request))]
    pub async fn place_order(
        &self,
        request: &CheckoutRequest,
        user_id: Option<UserId>,
    ) -> Result<Order, DomainError> {
        let started = Instant::now();
        let result = self.try_place_order(request, user_id).await;
        metrics::histogram!("checkout_duration_seconds").record(started.elapsed().as_secs_f64());

        match &result {
            Ok(order) => {
                metrics::counter!("checkout_orders_placed_total").increment(1);
                tracing::info!(
                    order_number = %order.order_number,
                    total = %order.totals.total,
                    items = order.items.len(),
                    "order placed"
                );
            }
            Err(e) => {
                metrics::counter!("checkout_failures_total", "reason" => e.reason()).increment(1);
                if matches!(e, DomainError::Persistence(_)) {
                    tracing::error!(error = %e, "checkout failed");
                } else {
                    tracing::debug!(error = %e, "checkout rejected");
                }
            }
        }
        result
    }

    async fn try_place_order(
        &self,
        request: &CheckoutRequest,
        user_id: Option<UserId>,
    ) -> Result<Order, DomainError> {
        let checkout = request.validate()?;

        let mut ids: Vec<ProductId> = checkout.lines.iter().map(|l| l.product_id).collect();
        ids.sort();
        ids.dedup();
        let products = self.store.get_products_by_ids(&ids).await?;

        let priced = price_cart(&checkout.lines, &products)?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let order = NewOrder {
                order_number: self.numbers.generate(Utc::now()),
                user_id,
                status: OrderStatus::Pending,
                payment_status: PaymentStatus::Pending,
                payment_method: checkout.payment_method.clone(),
                shipping: checkout.shipping.clone(),
                billing: checkout.billing.clone(),
                totals: priced.totals,
                notes: checkout.notes.clone(),
                items: priced.items.clone(),
            };

            match self.store.create_order(order, &priced.decrements).await {
                Ok(order) => return Ok(order),
                Err(StoreError::DuplicateOrderNumber(number)) => {
                    metrics::counter!("order_number_collisions_total").increment(1);
                    tracing::warn!(%number, attempt, "order number collision");
                    if attempt >= MAX_ORDER_NUMBER_ATTEMPTS {
                        return Err(DomainError::Persistence(StoreError::DuplicateOrderNumber(
                            number,
                        )));
                    }
                }
                Err(StoreError::InsufficientStock {
                    product_id,
                    requested,
                }) => {
                    // Stock moved between the read and the guarded write.
                    let product_name = products
                        .get(&product_id)
                        .map(|p| p.name.clone())
                        .unwrap_or_else(|| format!("Product {product_id}"));
                    return Err(DomainError::InsufficientStock {
                        product_id,
                        product_name,
                        requested,
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
