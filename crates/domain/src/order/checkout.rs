//! Turning a cart into an order.

use chrono::{DateTime, Utc};
use common::{CartId, Money, OrderId, OrderItemId, PaymentId, UserId};

use super::aggregate::{Order, OrderItem};
use super::state::{FulfillmentStatus, OrderStatus};
use super::value_objects::{
    HistoryEntry, Payment, PaymentMethod, PaymentStatus, ShippingAddress, StockAdjustment,
};
use crate::cart::amount_too_large;
use crate::error::DomainError;
use crate::product::Product;

/// A cart item paired with the product as read inside the checkout
/// transaction.
#[derive(Debug, Clone)]
pub struct CheckoutLine {
    pub product: Product,
    pub quantity: u32,
}

/// Everything a successful checkout writes.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order: Order,
    pub payment: Payment,
    pub history: HistoryEntry,
    /// The cart to empty once the order is committed.
    pub cart_id: CartId,
}

impl NewOrder {
    /// Stock to take out of the ledger, one entry per line.
    pub fn stock_withdrawals(&self) -> Vec<StockAdjustment> {
        self.order
            .items
            .iter()
            .map(|item| StockAdjustment {
                product_id: item.product_id,
                quantity: item.quantity,
            })
            .collect()
    }
}

/// Builds the order, pending payment and first history entry for a checkout.
///
/// Prices and shop ids are snapshotted from `lines`, which must hold
/// product state read under lock. Fails without side effects when the cart
/// is empty, the address is invalid, any line exceeds available stock or
/// the total does not fit in [`Money`].
pub fn plan_checkout(
    user_id: UserId,
    cart_id: CartId,
    lines: Vec<CheckoutLine>,
    shipping_address: ShippingAddress,
    method: PaymentMethod,
    now: DateTime<Utc>,
) -> Result<NewOrder, DomainError> {
    if lines.is_empty() {
        return Err(DomainError::EmptyCart);
    }
    shipping_address.validate()?;
    for line in &lines {
        line.product.ensure_available(line.quantity)?;
    }

    let order_id = OrderId::new();
    let items: Vec<OrderItem> = lines
        .into_iter()
        .map(|line| OrderItem {
            id: OrderItemId::new(),
            order_id,
            product_id: line.product.id,
            shop_id: line.product.shop_id,
            quantity: line.quantity,
            unit_price: line.product.price,
            status: FulfillmentStatus::Pending,
            tracking_number: None,
            carrier_name: None,
            notes: None,
            status_updated_at: None,
            status_updated_by: None,
        })
        .collect();
    let total_amount = items
        .iter()
        .map(|item| item.unit_price.checked_multiply(item.quantity))
        .try_fold(Money::zero(), |acc, subtotal| acc.checked_add(subtotal?))
        .ok_or_else(amount_too_large)?;

    let order = Order {
        id: order_id,
        user_id,
        total_amount,
        status: OrderStatus::Processing,
        shipping_address,
        tracking_number: None,
        carrier: None,
        shipped_at: None,
        delivered_at: None,
        cancelled_at: None,
        cancellation_reason: None,
        items,
        created_at: now,
        updated_at: now,
        version: 1,
    };
    let payment = Payment {
        id: PaymentId::new(),
        order_id,
        amount: total_amount,
        method,
        status: PaymentStatus::Pending,
        created_at: now,
    };
    let history = HistoryEntry::new(
        order_id,
        None,
        OrderStatus::Processing.as_str(),
        "Order placed",
        Some(user_id),
        now,
    );

    Ok(NewOrder {
        order,
        payment,
        history,
        cart_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::test_support::address;
    use common::ShopId;

    fn product(price_cents: i64, stock: u32) -> Product {
        Product::new(
            ShopId::new(),
            "Gadget",
            Money::from_cents(price_cents),
            stock,
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn plans_order_with_snapshot_prices_and_pending_payment() {
        let a = product(1000, 5);
        let b = product(500, 3);
        let user = UserId::new();
        let lines = vec![
            CheckoutLine {
                product: a.clone(),
                quantity: 2,
            },
            CheckoutLine {
                product: b.clone(),
                quantity: 1,
            },
        ];

        let planned = plan_checkout(
            user,
            CartId::new(),
            lines,
            address(),
            PaymentMethod::Momo,
            Utc::now(),
        )
        .unwrap();

        assert_eq!(planned.order.user_id, user);
        assert_eq!(planned.order.status, OrderStatus::Processing);
        assert_eq!(planned.order.total_amount, Money::from_cents(2500));
        assert_eq!(planned.payment.amount, planned.order.total_amount);
        assert_eq!(planned.payment.status, PaymentStatus::Pending);
        assert_eq!(planned.history.status, "PROCESSING");
        assert!(
            planned
                .order
                .items
                .iter()
                .all(|item| item.status == FulfillmentStatus::Pending)
        );
        assert_eq!(planned.order.items[0].shop_id, a.shop_id);

        let withdrawals = planned.stock_withdrawals();
        assert_eq!(withdrawals.len(), 2);
        assert_eq!(withdrawals[1].product_id, b.id);
        assert_eq!(withdrawals[1].quantity, 1);
    }

    #[test]
    fn empty_cart_is_rejected() {
        let err = plan_checkout(
            UserId::new(),
            CartId::new(),
            Vec::new(),
            address(),
            PaymentMethod::CreditCard,
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(err, DomainError::EmptyCart);
    }

    #[test]
    fn over_stock_line_names_the_product() {
        let scarce = product(1000, 1);
        let err = plan_checkout(
            UserId::new(),
            CartId::new(),
            vec![CheckoutLine {
                product: scarce.clone(),
                quantity: 2,
            }],
            address(),
            PaymentMethod::CreditCard,
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            DomainError::InsufficientStock {
                product_id: scarce.id,
                requested: 2,
                available: 1
            }
        );
    }

    #[test]
    fn invalid_address_is_rejected() {
        let mut bad = address();
        bad.phone = "12".to_string();
        let result = plan_checkout(
            UserId::new(),
            CartId::new(),
            vec![CheckoutLine {
                product: product(100, 1),
                quantity: 1,
            }],
            bad,
            PaymentMethod::BankTransfer,
            Utc::now(),
        );
        assert!(matches!(result, Err(DomainError::InvalidInput(_))));
    }

    #[test]
    fn total_beyond_money_range_is_rejected() {
        let pricey = product(crate::product::MAX_PRICE_CENTS, u32::MAX);
        let other = product(crate::product::MAX_PRICE_CENTS, u32::MAX);
        let err = plan_checkout(
            UserId::new(),
            CartId::new(),
            vec![
                CheckoutLine {
                    product: pricey,
                    quantity: 900_000_000,
                },
                CheckoutLine {
                    product: other,
                    quantity: 900_000_000,
                },
            ],
            address(),
            PaymentMethod::CreditCard,
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::InvalidInput(_)));
    }
}
