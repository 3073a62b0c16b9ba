//! Typed row IDs.
//!
//! Every table keys its rows with a Postgres `integer`. Each entity gets its
//! own wrapper so an order ID can never be passed where a cart item ID is
//! expected.

/// Declare an `i32` row ID type.
///
/// The generated type serializes as a bare number, prints as one, and (with
/// the `postgres` feature) binds and decodes as `integer`.
///
/// ```rust
/// # use kiosk_core::define_id;
/// define_id!(ShelfId);
/// define_id!(BinId);
///
/// let shelf = ShelfId::new(1);
/// assert_eq!(i32::from(shelf), 1);
/// // let _: BinId = shelf; // mismatched types
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[cfg_attr(feature = "postgres", derive(::sqlx::Type), sqlx(transparent))]
        #[serde(transparent)]
        pub struct $name(i32);

        impl $name {
            /// Wrap a raw row ID.
            #[must_use]
            pub const fn new(id: i32) -> Self {
                Self(id)
            }

            /// The raw row ID.
            #[must_use]
            pub const fn as_i32(&self) -> i32 {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                ::core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<i32> for $name {
            fn from(id: i32) -> Self {
                Self(id)
            }
        }

        impl From<$name> for i32 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id!(IdentityId);
define_id!(VariantId);
define_id!(CartItemId);
define_id!(OrderId);
