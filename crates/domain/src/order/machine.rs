use chrono::Utc;
use common::{NotificationCategory, Order, OrderId, UserId};
use store::{NotificationSink, OrderRepository, StatusChange, StoreError};

use super::{OrderAction, OrderError, SideEffect, Transition};
use crate::{Actor, DomainError, StockLedger};

/// Drives orders through the transition table.
///
/// Every transition is persisted with a version check before any
/// notification goes out. Notification failures are logged and dropped.
pub struct OrderStateMachine<S, N> {
    store: S,
    notifier: N,
}

impl<S, N> OrderStateMachine<S, N>
where
    S: OrderRepository,
    N: NotificationSink,
{
    pub fn new(store: S, notifier: N) -> Self {
        Self { store, notifier }
    }

    /// PAID → SHIPPED, by a seller of the order.
    pub async fn mark_shipped(&self, actor: &Actor, order_id: OrderId) -> Result<Order, DomainError> {
        self.apply(actor, order_id, OrderAction::MarkShipped, None)
            .await
    }

    /// SHIPPED → COMPLETED, by the buyer.
    pub async fn confirm_delivered(
        &self,
        actor: &Actor,
        order_id: OrderId,
    ) -> Result<Order, DomainError> {
        self.apply(actor, order_id, OrderAction::ConfirmDelivered, None)
            .await
    }

    /// PAID | SHIPPED → CANCELLED, by the buyer or an admin. Restocks every item.
    ///
    /// A blank reason is stored as no reason.
    pub async fn cancel(
        &self,
        actor: &Actor,
        order_id: OrderId,
        reason: Option<String>,
    ) -> Result<Order, DomainError> {
        let reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        self.apply(actor, order_id, OrderAction::Cancel, reason)
            .await
    }

    /// SHIPPED → DISPUTED, by the buyer.
    pub async fn open_dispute(
        &self,
        actor: &Actor,
        order_id: OrderId,
    ) -> Result<Order, DomainError> {
        self.apply(actor, order_id, OrderAction::OpenDispute, None)
            .await
    }

    #[tracing::instrument(skip(self, reason), fields(user_id = %actor.user_id, action = action.label()))]
    async fn apply(
        &self,
        actor: &Actor,
        order_id: OrderId,
        action: OrderAction,
        reason: Option<String>,
    ) -> Result<Order, DomainError> {
        let mut order = self
            .store
            .find_order(order_id)
            .await?
            .ok_or(OrderError::OrderNotFound(order_id))?;

        let transition = Transition::for_action(action);

        // Status first: repeating a finished action always reads as illegal.
        if !transition.allows_from(order.status) {
            return Err(OrderError::IllegalTransition {
                action,
                from: order.status,
            }
            .into());
        }
        if !transition.actor.permits(actor, &order) {
            return Err(OrderError::PermissionDenied {
                action,
                user_id: actor.user_id,
            }
            .into());
        }

        let restock = if transition.restock {
            StockLedger::releases(&order.items)
        } else {
            Vec::new()
        };
        let change = StatusChange {
            order_id,
            expected_version: order.version,
            status: transition.to,
            cancellation_reason: reason,
        };

        let version = self
            .store
            .update_status(&change, &restock)
            .await
            .map_err(|e| match e {
                StoreError::ConcurrencyConflict { order_id, .. } => {
                    DomainError::from(OrderError::Conflict(order_id))
                }
                StoreError::OrderNotFound(id) => DomainError::from(OrderError::OrderNotFound(id)),
                other => DomainError::from(other),
            })?;

        let from = order.status;
        order.status = transition.to;
        order.version = version;
        order.updated_at = Utc::now();
        if change.cancellation_reason.is_some() {
            order.cancellation_reason = change.cancellation_reason;
        }

        metrics::counter!(
            "order_transitions_total",
            "action" => action.label(),
            "to" => transition.to.as_str()
        )
        .increment(1);
        tracing::info!(
            %order_id,
            from = from.as_str(),
            to = order.status.as_str(),
            version = %order.version,
            "order transitioned"
        );

        self.dispatch(transition.notify, &order).await;

        Ok(order)
    }

    async fn dispatch(&self, effect: SideEffect, order: &Order) {
        let message = notification_message(order);
        let recipients: Vec<UserId> = match effect {
            SideEffect::NotifyBuyer => vec![order.buyer_id],
            SideEffect::NotifySellers => order.seller_ids().into_iter().collect(),
        };

        for user_id in recipients {
            if let Err(e) = self
                .notifier
                .notify(user_id, &message, NotificationCategory::Order)
                .await
            {
                tracing::warn!(
                    order_id = %order.id,
                    %user_id,
                    error = %e,
                    "failed to deliver order notification"
                );
            }
        }
    }
}

fn notification_message(order: &Order) -> String {
    let id = order.id;
    match order.status {
        common::OrderStatus::Shipped => format!("Your order {id} has been shipped"),
        common::OrderStatus::Completed => {
            format!("Order {id} was received and is now complete")
        }
        common::OrderStatus::Cancelled => match &order.cancellation_reason {
            Some(reason) => format!("Order {id} was cancelled: {reason}"),
            None => format!("Order {id} was cancelled"),
        },
        common::OrderStatus::Disputed => format!("The buyer opened a dispute on order {id}"),
        status => format!("Order {id} is now {status}"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use common::{Money, OrderStatus, Product, Role, User, Version};
    use store::{InMemoryStore, OrderQuery, StockMovement};

    use super::*;
    use crate::order::{OrderBuilder, PlaceOrder};
    use crate::ErrorKind;

    struct Fixture {
        store: InMemoryStore,
        machine: OrderStateMachine<InMemoryStore, InMemoryStore>,
        buyer: Actor,
        seller: Actor,
        product: Product,
        order: Order,
    }

    async fn fixture(stock: u32, quantity: u32) -> Fixture {
        let store = InMemoryStore::new();
        let seller = User::new("weaver@example.com", "Wen Weaver", Role::Seller);
        let buyer = User::new("buyer@example.com", "Ana Buyer", Role::Buyer);
        let product = Product::new(seller.id, "Scarf", Money::from_cents(3000), stock);
        let (buyer_actor, seller_actor) = (Actor::from(&buyer), Actor::from(&seller));
        store.add_user(buyer).await;
        store.add_user(seller).await;
        store.add_product(product.clone()).await;
        let (buyer, seller) = (buyer_actor, seller_actor);

        let order = OrderBuilder::new(store.clone())
            .place(&buyer, PlaceOrder::new("9 Elm Row", vec![]).line(product.id, quantity))
            .await
            .unwrap();

        Fixture {
            machine: OrderStateMachine::new(store.clone(), store.clone()),
            store,
            buyer,
            seller,
            product,
            order,
        }
    }

    #[tokio::test]
    async fn ship_then_confirm() {
        let f = fixture(5, 1).await;

        let shipped = f.machine.mark_shipped(&f.seller, f.order.id).await.unwrap();
        assert_eq!(shipped.status, OrderStatus::Shipped);
        assert_eq!(shipped.version.as_i64(), 2);

        let completed = f
            .machine
            .confirm_delivered(&f.buyer, f.order.id)
            .await
            .unwrap();
        assert_eq!(completed.status, OrderStatus::Completed);

        let buyer_notes = f.store.notifications_for(f.buyer.user_id).await;
        assert_eq!(buyer_notes.len(), 1);
        assert!(buyer_notes[0].message.contains("shipped"));
        assert_eq!(f.store.notifications_for(f.seller.user_id).await.len(), 1);
    }

    #[tokio::test]
    async fn wrong_actor_is_denied() {
        let f = fixture(5, 1).await;

        let err = f
            .machine
            .mark_shipped(&f.buyer, f.order.id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);

        f.machine.mark_shipped(&f.seller, f.order.id).await.unwrap();
        let err = f
            .machine
            .confirm_delivered(&f.seller, f.order.id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    }

    #[tokio::test]
    async fn cancel_restocks_and_records_reason() {
        let f = fixture(5, 2).await;
        assert_eq!(f.store.stock_of(f.product.id).await, Some(3));

        let cancelled = f
            .machine
            .cancel(&f.buyer, f.order.id, Some("  found a cheaper one ".to_string()))
            .await
            .unwrap();

        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(
            cancelled.cancellation_reason.as_deref(),
            Some("found a cheaper one")
        );
        assert_eq!(f.store.stock_of(f.product.id).await, Some(5));
    }

    #[tokio::test]
    async fn blank_reason_is_stored_as_none() {
        let f = fixture(5, 1).await;

        let cancelled = f
            .machine
            .cancel(&f.buyer, f.order.id, Some("   ".to_string()))
            .await
            .unwrap();

        assert_eq!(cancelled.cancellation_reason, None);
    }

    #[tokio::test]
    async fn dispute_requires_shipped() {
        let f = fixture(5, 1).await;

        let err = f
            .machine
            .open_dispute(&f.buyer, f.order.id)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::Order(OrderError::IllegalTransition {
                action: OrderAction::OpenDispute,
                from: OrderStatus::Paid
            })
        ));
    }

    #[tokio::test]
    async fn notification_failure_does_not_fail_transition() {
        let f = fixture(5, 1).await;
        f.store.set_fail_notifications(true).await;

        let shipped = f.machine.mark_shipped(&f.seller, f.order.id).await.unwrap();

        assert_eq!(shipped.status, OrderStatus::Shipped);
        let stored = f.store.find_order(f.order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Shipped);
    }

    #[tokio::test]
    async fn unknown_order() {
        let f = fixture(5, 1).await;
        let err = f
            .machine
            .mark_shipped(&f.seller, OrderId::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    /// Order store where the seller ships the order right after the first
    /// read, so the reader holds a stale version.
    #[derive(Clone)]
    struct ShippedAfterRead {
        inner: InMemoryStore,
        raced: Arc<AtomicBool>,
    }

    #[async_trait]
    impl OrderRepository for ShippedAfterRead {
        async fn place_order(
            &self,
            order: &Order,
            reservations: &[StockMovement],
        ) -> store::Result<()> {
            self.inner.place_order(order, reservations).await
        }

        async fn find_order(&self, id: OrderId) -> store::Result<Option<Order>> {
            let order = self.inner.find_order(id).await?;
            if let Some(read) = &order
                && !self.raced.swap(true, Ordering::SeqCst)
            {
                let ship = StatusChange {
                    order_id: id,
                    expected_version: read.version,
                    status: OrderStatus::Shipped,
                    cancellation_reason: None,
                };
                self.inner.update_status(&ship, &[]).await?;
            }
            Ok(order)
        }

        async fn update_status(
            &self,
            change: &StatusChange,
            restock: &[StockMovement],
        ) -> store::Result<Version> {
            self.inner.update_status(change, restock).await
        }

        async fn list_orders(&self, query: &OrderQuery) -> store::Result<Vec<Order>> {
            self.inner.list_orders(query).await
        }
    }

    #[tokio::test]
    async fn cancel_against_stale_version_conflicts() {
        let f = fixture(5, 2).await;
        let machine = OrderStateMachine::new(
            ShippedAfterRead {
                inner: f.store.clone(),
                raced: Arc::new(AtomicBool::new(false)),
            },
            f.store.clone(),
        );

        let err = machine
            .cancel(&f.buyer, f.order.id, Some("too slow".to_string()))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(matches!(
            err,
            DomainError::Order(OrderError::Conflict(id)) if id == f.order.id
        ));
        assert_eq!(f.store.stock_of(f.product.id).await, Some(3));
        let stored = f.store.find_order(f.order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Shipped);
        assert_eq!(stored.version, Version::new(2));
        assert_eq!(stored.cancellation_reason, None);
        assert!(f.store.notifications_for(f.buyer.user_id).await.is_empty());
        assert!(f.store.notifications_for(f.seller.user_id).await.is_empty());
    }
}
