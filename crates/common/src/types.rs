use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declares a UUID-backed identifier newtype.
///
/// Each identifier is its own type so that, for example, a `ShopId` can never
/// be passed where a `UserId` is expected.
macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an identifier from an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID.
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }

            /// Parses an identifier from its hyphenated string form.
            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

uuid_id!(
    /// Identifier of an authenticated user (customer, shop operator or admin).
    UserId
);
uuid_id!(
    /// Identifier of a selling shop.
    ShopId
);
uuid_id!(
    /// Identifier of a catalog product.
    ProductId
);
uuid_id!(
    /// Identifier of a cart record.
    CartId
);
uuid_id!(
    /// Opaque identifier of an anonymous shopping session.
    SessionId
);
uuid_id!(
    /// Identifier of a placed order.
    OrderId
);
uuid_id!(
    /// Identifier of a single line of a placed order.
    OrderItemId
);
uuid_id!(
    /// Identifier of a payment record.
    PaymentId
);
uuid_id!(
    /// Identifier of an order history entry.
    HistoryEntryId
);
