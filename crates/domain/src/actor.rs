//! The identity on whose behalf a core operation runs.

use common::{Order, Role, UserId};

/// The authenticated caller of a core operation.
///
/// Passed explicitly into every mutating operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Actor {
    pub user_id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn buyer(user_id: UserId) -> Self {
        Self::new(user_id, Role::Buyer)
    }

    pub fn seller(user_id: UserId) -> Self {
        Self::new(user_id, Role::Seller)
    }

    pub fn admin(user_id: UserId) -> Self {
        Self::new(user_id, Role::Admin)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Returns true if the actor placed the order.
    pub fn is_buyer_of(&self, order: &Order) -> bool {
        order.buyer_id == self.user_id
    }

    /// Returns true if the actor sells at least one item of the order.
    pub fn sells_in(&self, order: &Order) -> bool {
        order.has_seller(self.user_id)
    }
}

impl From<&common::User> for Actor {
    fn from(user: &common::User) -> Self {
        Self::new(user.id, user.role)
    }
}
