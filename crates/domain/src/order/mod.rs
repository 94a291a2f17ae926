//! Order aggregate, checkout planning and related types.

mod aggregate;
mod checkout;
mod state;
mod value_objects;

pub use aggregate::{Order, OrderAction, OrderChange, OrderItem};
pub use checkout::{CheckoutLine, NewOrder, plan_checkout};
pub use state::{FulfillmentStatus, OrderStatus, derive_order_status};
pub use value_objects::{
    HistoryEntry, ItemStatusUpdate, Payment, PaymentMethod, PaymentStatus, ShipmentDetails,
    ShippingAddress, StockAdjustment,
};

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::Utc;
    use common::{CartId, Money, ShopId, UserId};

    use super::*;
    use crate::product::Product;

    pub fn address() -> ShippingAddress {
        ShippingAddress {
            full_name: "Ama Mensah".to_string(),
            street: "12 Oxford St".to_string(),
            city: "Accra".to_string(),
            state: "Greater Accra".to_string(),
            zip_code: None,
            country: "Ghana".to_string(),
            phone: "0241234567".to_string(),
        }
    }

    fn place(products: &[(Product, u32)]) -> Order {
        let lines = products
            .iter()
            .map(|(product, quantity)| CheckoutLine {
                product: product.clone(),
                quantity: *quantity,
            })
            .collect();
        plan_checkout(
            UserId::new(),
            CartId::new(),
            lines,
            address(),
            PaymentMethod::CreditCard,
            Utc::now(),
        )
        .unwrap()
        .order
    }

    fn product(shop: ShopId, price_cents: i64) -> Product {
        Product::new(shop, "Thing", Money::from_cents(price_cents), 10, Utc::now()).unwrap()
    }

    /// An order with two lines, both sold by the returned shop.
    pub fn single_shop_order() -> (Order, ShopId) {
        let shop = ShopId::new();
        let order = place(&[(product(shop, 1000), 2), (product(shop, 250), 1)]);
        (order, shop)
    }

    /// An order whose first line is sold by shop A and second by shop B.
    pub fn two_shop_order() -> (Order, ShopId, ShopId) {
        let shop_a = ShopId::new();
        let shop_b = ShopId::new();
        let order = place(&[(product(shop_a, 1000), 1), (product(shop_b, 2000), 2)]);
        (order, shop_a, shop_b)
    }
}
