//! Actor identity and order visibility.

use common::{ShopId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::order::Order;

/// Role carried by an authenticated identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    User,
    Shop,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Shop => "SHOP",
            Role::Admin => "ADMIN",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "USER" => Ok(Role::User),
            "SHOP" => Ok(Role::Shop),
            "ADMIN" => Ok(Role::Admin),
            other => Err(DomainError::InvalidInput(format!("unknown role: {other}"))),
        }
    }
}

/// An authenticated caller, as asserted by the authentication collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub subject_id: UserId,
    pub role: Role,
    pub shop_id: Option<ShopId>,
    #[serde(default)]
    pub verified: bool,
}

impl Actor {
    pub fn user(subject_id: UserId) -> Self {
        Self {
            subject_id,
            role: Role::User,
            shop_id: None,
            verified: true,
        }
    }

    pub fn shop(subject_id: UserId, shop_id: ShopId) -> Self {
        Self {
            subject_id,
            role: Role::Shop,
            shop_id: Some(shop_id),
            verified: true,
        }
    }

    pub fn admin(subject_id: UserId) -> Self {
        Self {
            subject_id,
            role: Role::Admin,
            shop_id: None,
            verified: true,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Returns the shop this actor sells for.
    ///
    /// Fails with `Forbidden` for non-shop actors and for shop actors whose
    /// identity carries no shop id.
    pub fn selling_shop(&self) -> Result<ShopId, DomainError> {
        match (self.role, self.shop_id) {
            (Role::Shop, Some(shop_id)) => Ok(shop_id),
            (Role::Shop, None) => Err(DomainError::Forbidden(
                "shop identity carries no shop id".to_string(),
            )),
            _ => Err(DomainError::Forbidden(
                "only a selling shop may perform this action".to_string(),
            )),
        }
    }

    /// Checks that this actor may manage products of `shop_id`.
    pub fn ensure_manages_shop(&self, shop_id: ShopId) -> Result<(), DomainError> {
        if self.is_admin() {
            return Ok(());
        }
        if self.selling_shop()? != shop_id {
            return Err(DomainError::Forbidden(
                "product belongs to another shop".to_string(),
            ));
        }
        Ok(())
    }
}

/// The slice of orders an actor may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderScope {
    /// Every order, unfiltered.
    All,
    /// Only line items sold by this shop, grouped by their parent order.
    Shop(ShopId),
    /// Only orders placed by this user.
    Purchaser(UserId),
}

impl OrderScope {
    pub fn for_actor(actor: &Actor) -> Result<Self, DomainError> {
        match actor.role {
            Role::Admin => Ok(OrderScope::All),
            Role::Shop => actor.selling_shop().map(OrderScope::Shop),
            Role::User => Ok(OrderScope::Purchaser(actor.subject_id)),
        }
    }

    /// Returns the part of `order` visible under this scope, or `None` if
    /// nothing is visible.
    ///
    /// A shop sees only its own items and a total over those items.
    pub fn project(&self, order: Order) -> Option<Order> {
        match *self {
            OrderScope::All => Some(order),
            OrderScope::Purchaser(user_id) => (order.user_id == user_id).then_some(order),
            OrderScope::Shop(shop_id) => {
                let mut order = order;
                order.items.retain(|item| item.shop_id == shop_id);
                if order.items.is_empty() {
                    return None;
                }
                order.total_amount = order.items.iter().map(|item| item.subtotal()).sum();
                Some(order)
            }
        }
    }

    /// Like [`project`](Self::project) but fails with `Forbidden` when nothing
    /// is visible. Existence of the order is not hidden.
    pub fn authorize_read(&self, order: Order) -> Result<Order, DomainError> {
        let order_id = order.id;
        self.project(order).ok_or_else(|| {
            DomainError::Forbidden(format!("not allowed to view order {order_id}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::test_support::two_shop_order;

    #[test]
    fn role_parsing_is_case_insensitive() {
        assert_eq!("shop".parse::<Role>().unwrap(), Role::Shop);
        assert_eq!("ADMIN".parse::<Role>().unwrap(), Role::Admin);
        assert!("root".parse::<Role>().is_err());
    }

    #[test]
    fn scope_per_role() {
        let user = UserId::new();
        let shop = ShopId::new();
        assert_eq!(
            OrderScope::for_actor(&Actor::admin(user)).unwrap(),
            OrderScope::All
        );
        assert_eq!(
            OrderScope::for_actor(&Actor::shop(user, shop)).unwrap(),
            OrderScope::Shop(shop)
        );
        assert_eq!(
            OrderScope::for_actor(&Actor::user(user)).unwrap(),
            OrderScope::Purchaser(user)
        );
    }

    #[test]
    fn shop_without_shop_id_is_forbidden() {
        let actor = Actor {
            subject_id: UserId::new(),
            role: Role::Shop,
            shop_id: None,
            verified: true,
        };
        assert!(matches!(
            OrderScope::for_actor(&actor),
            Err(DomainError::Forbidden(_))
        ));
    }

    #[test]
    fn shop_projection_keeps_only_own_items() {
        let (order, shop_a, _shop_b) = two_shop_order();
        let visible = OrderScope::Shop(shop_a).project(order.clone()).unwrap();

        assert_eq!(visible.items.len(), 1);
        assert!(visible.items.iter().all(|item| item.shop_id == shop_a));
        assert_eq!(visible.total_amount, visible.items[0].subtotal());
        assert!(visible.total_amount < order.total_amount);
    }

    #[test]
    fn unrelated_actors_are_forbidden_not_hidden() {
        let (order, _, _) = two_shop_order();
        assert!(matches!(
            OrderScope::Shop(ShopId::new()).authorize_read(order.clone()),
            Err(DomainError::Forbidden(_))
        ));
        assert!(matches!(
            OrderScope::Purchaser(UserId::new()).authorize_read(order.clone()),
            Err(DomainError::Forbidden(_))
        ));
        let owner = order.user_id;
        assert!(OrderScope::Purchaser(owner).authorize_read(order).is_ok());
    }

    #[test]
    fn managing_products_requires_own_shop_or_admin() {
        let shop = ShopId::new();
        assert!(Actor::shop(UserId::new(), shop).ensure_manages_shop(shop).is_ok());
        assert!(Actor::admin(UserId::new()).ensure_manages_shop(shop).is_ok());
        assert!(
            Actor::shop(UserId::new(), ShopId::new())
                .ensure_manages_shop(shop)
                .is_err()
        );
        assert!(Actor::user(UserId::new()).ensure_manages_shop(shop).is_err());
    }
}
