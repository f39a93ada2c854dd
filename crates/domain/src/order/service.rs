//! Order query and tracking service.
//!
//! Read paths scoped to the acting subject, plus the admin writes that move
//! an order through its statuses.

use common::OrderId;
use order_store::{OrderFilter, OrderRecord, OrderStore, StoreError};
use serde::Deserialize;
use tracing::info;

use super::engine::settle;
use super::value_objects::OrderSummary;
use super::{OrderError, OrderListing, OrderStatus, OrderView, TrackingEvent};
use crate::identity::{Role, Subject, require_role};

const MAX_PAGE_SIZE: i64 = 100;
const MAX_TRACKING_STATUS_LEN: usize = 50;

/// Parameters of the admin order listing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ListOrdersQuery {
    pub status: Option<String>,
    pub page: i64,
    pub limit: i64,
}

impl Default for ListOrdersQuery {
    fn default() -> Self {
        Self {
            status: None,
            page: 1,
            limit: 10,
        }
    }
}

/// Service for reading orders and recording their progress.
pub struct OrderQueryService<S: OrderStore> {
    store: S,
}

impl<S: OrderStore> OrderQueryService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Lists the subject's own orders, newest first.
    #[tracing::instrument(skip(self, subject), fields(subject_id = %subject.id))]
    pub async fn list_orders(&self, subject: &Subject) -> Result<Vec<OrderView>, OrderError> {
        require_role(subject, Role::Customer)?;

        let records = self.store.orders_for_subject(subject.id).await?;
        let mut views = Vec::with_capacity(records.len());
        for record in records {
            views.push(self.assemble(record).await?);
        }
        Ok(views)
    }

    /// Loads one of the subject's orders.
    ///
    /// Orders owned by someone else are reported as not found.
    #[tracing::instrument(skip(self, subject), fields(subject_id = %subject.id))]
    pub async fn get_order_detail(
        &self,
        subject: &Subject,
        order_id: OrderId,
    ) -> Result<OrderView, OrderError> {
        require_role(subject, Role::Customer)?;

        let record = self
            .store
            .get_order_for_subject(subject.id, order_id)
            .await?
            .ok_or(OrderError::OrderNotFound { order_id })?;
        self.assemble(record).await
    }

    /// Sets an order's status and records the change on its tracking trail.
    #[tracing::instrument(skip(self, subject), fields(subject_id = %subject.id))]
    pub async fn update_status(
        &self,
        subject: &Subject,
        order_id: OrderId,
        status: &str,
    ) -> Result<TrackingEvent, OrderError> {
        require_role(subject, Role::Admin)?;
        let status: OrderStatus = status
            .parse()
            .map_err(|_| OrderError::InvalidStatus(status.to_string()))?;

        let mut tx = self.store.begin().await?;
        let result = async {
            if !tx.set_order_status(order_id, status.as_str()).await? {
                return Err(OrderError::OrderNotFound { order_id });
            }
            let event = tx
                .append_tracking_event(
                    order_id,
                    status.tracking_label(),
                    &format!("Order status changed to {status}"),
                )
                .await
                .map_err(|e| not_found_or(e, order_id))?;
            Ok::<_, OrderError>(TrackingEvent::from(event))
        }
        .await;
        let event = settle(tx, result).await?;

        metrics::counter!("order_status_updates_total", "status" => status.as_str()).increment(1);
        info!(order_id = %order_id, status = %status, "Order status updated");
        Ok(event)
    }

    /// Appends a free-form note to an order's tracking trail.
    #[tracing::instrument(skip(self, subject, description), fields(subject_id = %subject.id))]
    pub async fn append_tracking_event(
        &self,
        subject: &Subject,
        order_id: OrderId,
        status: &str,
        description: &str,
    ) -> Result<TrackingEvent, OrderError> {
        require_role(subject, Role::Admin)?;
        let status = status.trim();
        if status.is_empty() || status.len() > MAX_TRACKING_STATUS_LEN {
            return Err(OrderError::InvalidStatus(status.to_string()));
        }

        let mut tx = self.store.begin().await?;
        let result = tx
            .append_tracking_event(order_id, status, description)
            .await
            .map(TrackingEvent::from)
            .map_err(|e| not_found_or(e, order_id));
        let event = settle(tx, result).await?;

        info!(order_id = %order_id, status = %event.status, "Tracking event appended");
        Ok(event)
    }

    /// Lists orders across all subjects, newest first, one page at a time.
    #[tracing::instrument(skip(self, subject), fields(subject_id = %subject.id))]
    pub async fn list_all_orders(
        &self,
        subject: &Subject,
        query: ListOrdersQuery,
    ) -> Result<OrderListing, OrderError> {
        require_role(subject, Role::Admin)?;

        let status = match query.status.as_deref() {
            None | Some("") => None,
            Some(raw) => {
                let parsed: OrderStatus = raw
                    .parse()
                    .map_err(|_| OrderError::InvalidStatus(raw.to_string()))?;
                Some(parsed.as_str().to_string())
            }
        };
        let page = query.page.max(1);
        let limit = query.limit.clamp(1, MAX_PAGE_SIZE);

        let result = self
            .store
            .list_orders(OrderFilter {
                status,
                limit,
                offset: (page - 1).saturating_mul(limit),
            })
            .await?;

        Ok(OrderListing {
            orders: result.orders.into_iter().map(OrderSummary::from).collect(),
            total: result.total,
            page,
            total_pages: (result.total + limit - 1) / limit,
        })
    }

    async fn assemble(&self, record: OrderRecord) -> Result<OrderView, OrderError> {
        let items = self.store.items_for_order(record.id).await?;
        let tracking = self.store.tracking_for_order(record.id).await?;

        Ok(OrderView {
            summary: OrderSummary::from(record),
            items: items.into_iter().map(Into::into).collect(),
            tracking: tracking.into_iter().map(Into::into).collect(),
        })
    }
}

fn not_found_or(error: StoreError, order_id: OrderId) -> OrderError {
    match error {
        StoreError::OrderNotFound(_) => OrderError::OrderNotFound { order_id },
        other => OrderError::Store(other),
    }
}

#[cfg(test)]
mod tests {
    use common::SubjectId;
    use order_store::InMemoryOrderStore;

    use super::*;
    use crate::order::ErrorKind;

    async fn store_with_order(subject: i64) -> (InMemoryOrderStore, OrderId) {
        let store = InMemoryOrderStore::new();
        let mut tx = store.begin().await.unwrap();
        let order = tx
            .insert_order(order_store::NewOrder {
                subject_id: SubjectId::new(subject),
                total_amount: rust_decimal::Decimal::ONE,
                shipping_address: r#"{"city":"Oslo"}"#.to_string(),
                status: "pending".to_string(),
            })
            .await
            .unwrap();
        tx.commit().await.unwrap();
        (store, order.id)
    }

    fn admin() -> Subject {
        Subject::admin(SubjectId::new(99))
    }

    #[tokio::test]
    async fn test_update_status_appends_tracking() {
        let (store, order_id) = store_with_order(1).await;
        let service = OrderQueryService::new(store.clone());

        let event = service
            .update_status(&admin(), order_id, "shipped")
            .await
            .unwrap();
        assert_eq!(event.status, "Shipped");
        assert_eq!(event.description, "Order status changed to shipped");

        let order = store.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.status, "shipped");
        assert_eq!(store.tracking_event_count().await, 1);
    }

    #[tokio::test]
    async fn test_update_status_rejects_unknown_status() {
        let (store, order_id) = store_with_order(1).await;
        let service = OrderQueryService::new(store);

        let err = service
            .update_status(&admin(), order_id, "lost")
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::InvalidStatus(s) if s == "lost"));
    }

    #[tokio::test]
    async fn test_update_status_missing_order() {
        let (store, _) = store_with_order(1).await;
        let service = OrderQueryService::new(store.clone());

        let err = service
            .update_status(&admin(), OrderId::new(404), "shipped")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(store.tracking_event_count().await, 0);
    }

    #[tokio::test]
    async fn test_update_status_requires_admin() {
        let (store, order_id) = store_with_order(1).await;
        let service = OrderQueryService::new(store.clone());

        let err = service
            .update_status(&Subject::customer(SubjectId::new(1)), order_id, "cancelled")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let order = store.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.status, "pending");
    }

    #[tokio::test]
    async fn test_status_and_tracking_roll_back_together() {
        let (store, order_id) = store_with_order(1).await;
        store.set_fail_on_tracking(true);
        let service = OrderQueryService::new(store.clone());

        let err = service
            .update_status(&admin(), order_id, "delivered")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Store);

        let order = store.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.status, "pending");
    }

    #[tokio::test]
    async fn test_append_tracking_event() {
        let (store, order_id) = store_with_order(1).await;
        let service = OrderQueryService::new(store);

        let event = service
            .append_tracking_event(&admin(), order_id, "Out for delivery", "Courier picked up")
            .await
            .unwrap();
        assert_eq!(event.order_id, order_id);

        let err = service
            .append_tracking_event(&admin(), OrderId::new(404), "Note", "x")
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::OrderNotFound { .. }));

        let err = service
            .append_tracking_event(&admin(), order_id, "  ", "x")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_list_all_orders_paginates() {
        let (store, _) = store_with_order(1).await;
        let mut tx = store.begin().await.unwrap();
        for subject in 2..=5 {
            tx.insert_order(order_store::NewOrder {
                subject_id: SubjectId::new(subject),
                total_amount: rust_decimal::Decimal::ONE,
                shipping_address: "{}".to_string(),
                status: "pending".to_string(),
            })
            .await
            .unwrap();
        }
        tx.commit().await.unwrap();
        let service = OrderQueryService::new(store);

        let listing = service
            .list_all_orders(
                &admin(),
                ListOrdersQuery {
                    status: None,
                    page: 2,
                    limit: 2,
                },
            )
            .await
            .unwrap();
        assert_eq!(listing.total, 5);
        assert_eq!(listing.page, 2);
        assert_eq!(listing.total_pages, 3);
        assert_eq!(listing.orders.len(), 2);

        let err = service
            .list_all_orders(
                &admin(),
                ListOrdersQuery {
                    status: Some("teleported".to_string()),
                    ..ListOrdersQuery::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_empty_listing_has_zero_pages() {
        let service = OrderQueryService::new(InMemoryOrderStore::new());
        let listing = service
            .list_all_orders(&admin(), ListOrdersQuery::default())
            .await
            .unwrap();
        assert_eq!(listing.total, 0);
        assert_eq!(listing.total_pages, 0);
    }

    #[tokio::test]
    async fn test_malformed_shipping_reads_as_null() {
        let (store, order_id) = store_with_order(1).await;
        store.corrupt_shipping_address(order_id, "{oops").await;
        let service = OrderQueryService::new(store);

        let view = service
            .get_order_detail(&Subject::customer(SubjectId::new(1)), order_id)
            .await
            .unwrap();
        assert!(view.summary.shipping_address.is_none());
    }
}
