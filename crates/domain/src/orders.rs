//! Order lookups for customers and order management for admins.

use store::{
    Order, OrderId, OrderQuery, OrderSortField, OrderStatus, OrderStore, OrderUpdate, Page,
    PageRequest, PaymentStatus, SortDirection, UserId,
};

use crate::checkout::NOTES_MAX;
use crate::error::DomainError;

/// Default page size of a customer's order history.
pub const CUSTOMER_PER_PAGE: u32 = 10;

/// Default page size of the admin order listing.
pub const ADMIN_PER_PAGE: u32 = 15;

/// Whether `viewer` may see `order`.
///
/// Only an authenticated viewer looking at someone else's order is refused.
/// Guests can open any order whose number they know, and orders without an
/// owner are visible to everyone.
pub fn is_visible_to(order: &Order, viewer: Option<UserId>) -> bool {
    match (viewer, order.user_id) {
        (Some(viewer), Some(owner)) => viewer == owner,
        _ => true,
    }
}

/// Parses a status name, reporting a bad value against `field`.
pub fn parse_status(field: &str, value: &str) -> Result<OrderStatus, DomainError> {
    value
        .trim()
        .parse()
        .map_err(|_| DomainError::validation(field, format!("The selected {field} is invalid.")))
}

/// Parses a payment status name, reporting a bad value against `field`.
pub fn parse_payment_status(field: &str, value: &str) -> Result<PaymentStatus, DomainError> {
    value
        .trim()
        .parse()
        .map_err(|_| DomainError::validation(field, format!("The selected {field} is invalid.")))
}

/// Raw admin listing parameters, as they arrive on the query string.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct AdminOrderFilter {
    pub status: Option<String>,
    pub payment_status: Option<String>,
    pub search: Option<String>,
    pub from_date: Option<String>,
    pub to_date: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl AdminOrderFilter {
    /// Turns the raw parameters into a store query. Blank values are ignored.
    pub fn to_query(&self) -> Result<(OrderQuery, PageRequest), DomainError> {
        let mut query = OrderQuery::new();

        if let Some(status) = non_blank(&self.status) {
            query = query.status(parse_status("status", status)?);
        }
        if let Some(status) = non_blank(&self.payment_status) {
            query = query.payment_status(parse_payment_status("payment_status", status)?);
        }
        if let Some(term) = non_blank(&self.search) {
            query = query.search(term);
        }

        let from = non_blank(&self.from_date)
            .map(|d| parse_date("from_date", d, false))
            .transpose()?;
        let to = non_blank(&self.to_date)
            .map(|d| parse_date("to_date", d, true))
            .transpose()?;
        query = query.created_between(from, to);

        let field = match non_blank(&self.sort_by) {
            None | Some("created_at") => OrderSortField::CreatedAt,
            Some("total") => OrderSortField::Total,
            Some(_) => {
                return Err(DomainError::validation(
                    "sort_by",
                    "The selected sort_by is invalid.",
                ));
            }
        };
        let direction = parse_direction("sort_order", non_blank(&self.sort_order))?;
        query = query.sort(field, direction);

        let page = PageRequest::from_query(self.page, self.per_page, ADMIN_PER_PAGE);
        Ok((query, page))
    }
}

pub(crate) fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// `asc` or `desc` in any case; absent means descending.
pub(crate) fn parse_direction(
    field: &str,
    value: Option<&str>,
) -> Result<SortDirection, DomainError> {
    match value.map(str::to_ascii_lowercase).as_deref() {
        None | Some("desc") => Ok(SortDirection::Descending),
        Some("asc") => Ok(SortDirection::Ascending),
        Some(_) => Err(DomainError::validation(
            field,
            format!("The selected {field} is invalid."),
        )),
    }
}

/// Accepts RFC 3339 timestamps or plain `YYYY-MM-DD` dates. A plain date
/// covers the whole day when it ends a range.
fn parse_date(
    field: &str,
    value: &str,
    end_of_day: bool,
) -> Result<chrono::DateTime<chrono::Utc>, DomainError> {
    if let Ok(ts) = chrono::DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&chrono::Utc));
    }
    let date = chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
        DomainError::validation(field, format!("The {field} field must be a valid date."))
    })?;
    let time = if end_of_day {
        date.and_hms_milli_opt(23, 59, 59, 999)
    } else {
        date.and_hms_opt(0, 0, 0)
    };
    time.map(|t| t.and_utc()).ok_or_else(|| {
        DomainError::validation(field, format!("The {field} field must be a valid date."))
    })
}

/// Read and update operations on placed orders.
#[derive(Clone)]
pub struct OrderService<S> {
    store: S,
}

impl<S: OrderStore> OrderService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Finds an order by its number, as seen by `viewer`.
    ///
    /// Absent orders and orders the viewer may not see are reported the same
    /// way, so order numbers can't be enumerated.
    #[tracing::instrument(skip(self))]
    pub async fn find_by_number(
        &self,
        order_number: &str,
        viewer: Option<UserId>,
    ) -> Result<Order, DomainError> {
        match self.store.find_order_by_number(order_number).await? {
            Some(order) if is_visible_to(&order, viewer) => Ok(order),
            _ => Err(DomainError::order_not_found()),
        }
    }

    /// A user's own orders, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn list_for_user(
        &self,
        user_id: UserId,
        page: PageRequest,
    ) -> Result<Page<Order>, DomainError> {
        Ok(self.store.list_orders_for_user(user_id, page).await?)
    }

    /// All orders matching an admin query.
    #[tracing::instrument(skip(self))]
    pub async fn list(
        &self,
        query: &OrderQuery,
        page: PageRequest,
    ) -> Result<Page<Order>, DomainError> {
        Ok(self.store.query_orders(query, page).await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get(&self, id: OrderId) -> Result<Order, DomainError> {
        self.store
            .find_order(id)
            .await?
            .ok_or_else(DomainError::order_not_found)
    }

    /// Moves an order to `status` if the transition is allowed.
    ///
    /// The status the transition was checked against must still be current
    /// when the write lands. If another update got there first, the move is
    /// re-judged from the new status and reported as an invalid transition.
    #[tracing::instrument(skip(self))]
    pub async fn update_status(
        &self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<Order, DomainError> {
        let order = self.get(id).await?;
        if !order.status.can_transition_to(status) {
            return Err(DomainError::InvalidStatusTransition {
                from: order.status,
                to: status,
            });
        }
        if order.status == status {
            return Ok(order);
        }

        let Some(updated) = self.store.set_order_status(id, order.status, status).await? else {
            let current = self.get(id).await?;
            tracing::warn!(
                order_number = %current.order_number,
                expected = %order.status,
                found = %current.status,
                "order status changed concurrently"
            );
            return Err(DomainError::InvalidStatusTransition {
                from: current.status,
                to: status,
            });
        };
        metrics::counter!("order_status_updates_total", "status" => status.as_str()).increment(1);
        tracing::info!(
            order_number = %updated.order_number,
            from = %order.status,
            to = %status,
            "order status changed"
        );
        Ok(updated)
    }

    #[tracing::instrument(skip(self))]
    pub async fn update_payment_status(
        &self,
        id: OrderId,
        payment_status: PaymentStatus,
    ) -> Result<Order, DomainError> {
        self.apply(id, OrderUpdate::payment_status(payment_status))
            .await
    }

    /// Replaces the order notes.
    #[tracing::instrument(skip(self, notes))]
    pub async fn update_notes(&self, id: OrderId, notes: &str) -> Result<Order, DomainError> {
        let notes = notes.trim();
        if notes.is_empty() {
            return Err(DomainError::validation(
                "notes",
                "The notes field is required.",
            ));
        }
        if notes.chars().count() > NOTES_MAX {
            return Err(DomainError::validation(
                "notes",
                format!("The notes field must not be greater than {NOTES_MAX} characters."),
            ));
        }
        self.apply(id, OrderUpdate::notes(notes)).await
    }

    async fn apply(&self, id: OrderId, update: OrderUpdate) -> Result<Order, DomainError> {
        self.store
            .update_order(id, update)
            .await?
            .ok_or_else(DomainError::order_not_found)
    }
}
