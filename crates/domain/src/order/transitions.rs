//! Declarative order transition table.
//!
//! ```text
//! PAID ──ship──► SHIPPED ──confirm──► COMPLETED
//!   │               ├──────dispute──► DISPUTED
//!   └─────cancel────┴──────cancel───► CANCELLED
//! ```
//!
//! Each action has exactly one row. The state machine looks the row up,
//! checks the current status against `from`, then the actor against `actor`,
//! and finally applies `to`, `restock` and `notify`.

use common::{Order, OrderStatus};

use crate::Actor;

/// An action a user can request on an existing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderAction {
    MarkShipped,
    ConfirmDelivered,
    Cancel,
    OpenDispute,
}

impl OrderAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderAction::MarkShipped => "ship",
            OrderAction::ConfirmDelivered => "confirm delivery of",
            OrderAction::Cancel => "cancel",
            OrderAction::OpenDispute => "dispute",
        }
    }

    /// Short label used in metrics and logs.
    pub fn label(&self) -> &'static str {
        match self {
            OrderAction::MarkShipped => "mark_shipped",
            OrderAction::ConfirmDelivered => "confirm_delivered",
            OrderAction::Cancel => "cancel",
            OrderAction::OpenDispute => "open_dispute",
        }
    }
}

impl std::fmt::Display for OrderAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who may perform a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorRule {
    /// A seller of at least one item in the order.
    SellerInOrder,
    /// The buyer who placed the order.
    Buyer,
    /// The buyer, or any admin.
    BuyerOrAdmin,
}

impl ActorRule {
    pub fn permits(&self, actor: &Actor, order: &Order) -> bool {
        match self {
            ActorRule::SellerInOrder => actor.sells_in(order),
            ActorRule::Buyer => actor.is_buyer_of(order),
            ActorRule::BuyerOrAdmin => actor.is_buyer_of(order) || actor.is_admin(),
        }
    }
}

/// Who hears about a transition once it is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffect {
    NotifyBuyer,
    /// Every distinct seller with an item in the order.
    NotifySellers,
}

/// One row of the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub action: OrderAction,
    pub from: &'static [OrderStatus],
    pub to: OrderStatus,
    pub actor: ActorRule,
    /// Give every item's quantity back to its product.
    pub restock: bool,
    pub notify: SideEffect,
}

pub const TRANSITIONS: &[Transition] = &[
    Transition {
        action: OrderAction::MarkShipped,
        from: &[OrderStatus::Paid],
        to: OrderStatus::Shipped,
        actor: ActorRule::SellerInOrder,
        restock: false,
        notify: SideEffect::NotifyBuyer,
    },
    Transition {
        action: OrderAction::ConfirmDelivered,
        from: &[OrderStatus::Shipped],
        to: OrderStatus::Completed,
        actor: ActorRule::Buyer,
        restock: false,
        notify: SideEffect::NotifySellers,
    },
    Transition {
        action: OrderAction::Cancel,
        from: &[OrderStatus::Paid, OrderStatus::Shipped],
        to: OrderStatus::Cancelled,
        actor: ActorRule::BuyerOrAdmin,
        restock: true,
        notify: SideEffect::NotifyBuyer,
    },
    Transition {
        action: OrderAction::OpenDispute,
        from: &[OrderStatus::Shipped],
        to: OrderStatus::Disputed,
        actor: ActorRule::Buyer,
        restock: false,
        notify: SideEffect::NotifySellers,
    },
];

impl Transition {
    /// Returns the table row for an action.
    pub fn for_action(action: OrderAction) -> &'static Transition {
        match action {
            OrderAction::MarkShipped => &TRANSITIONS[0],
            OrderAction::ConfirmDelivered => &TRANSITIONS[1],
            OrderAction::Cancel => &TRANSITIONS[2],
            OrderAction::OpenDispute => &TRANSITIONS[3],
        }
    }

    /// Returns true if the row applies to an order in `status`.
    pub fn allows_from(&self, status: OrderStatus) -> bool {
        self.from.contains(&status)
    }
}
