//! Stable numeric identities
//!
//! Every identity the renderer keys a table by is an explicitly issued number.
//! Two ids are equal exactly when their numbers are equal; nothing is keyed by
//! pointer or allocation identity.

use std::fmt;

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub u32);

        impl $name {
            /// Raw numeric value
            pub const fn raw(self) -> u32 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

numeric_id!(
    /// A renderable scene object
    ObjectId,
    "object"
);
numeric_id!(
    /// A rendering layer (one draw pipeline / pass style)
    LayerId,
    "layer"
);
numeric_id!(
    /// A model (index/vertex data shared by many objects)
    ModelId,
    "model"
);
numeric_id!(
    /// An external resource such as an image
    ResourceId,
    "resource"
);

/// Issues fresh ids for each identity kind
///
/// Owned by the composition root and passed to whoever creates objects, models,
/// layers or resources. Ids are sequential per kind and never reused, so two
/// issuers created the same way produce the same sequence.
///
/// # Panics
///
/// Every issuing method panics once its kind has handed out `u32::MAX` ids;
/// ids never wrap around.
#[derive(Debug, Default, Clone)]
pub struct IdIssuer {
    next_object: u32,
    next_layer: u32,
    next_model: u32,
    next_resource: u32,
}

impl IdIssuer {
    /// Create an issuer starting every sequence at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a new object id
    pub fn object(&mut self) -> ObjectId {
        ObjectId(Self::bump(&mut self.next_object))
    }

    /// Issue a new layer id
    pub fn layer(&mut self) -> LayerId {
        LayerId(Self::bump(&mut self.next_layer))
    }

    /// Issue a new model id
    pub fn model(&mut self) -> ModelId {
        ModelId(Self::bump(&mut self.next_model))
    }

    /// Issue a new resource id
    pub fn resource(&mut self) -> ResourceId {
        ResourceId(Self::bump(&mut self.next_resource))
    }

    /// Return `counter` and advance it, panicking when the id space is spent
    fn bump(counter: &mut u32) -> u32 {
        let id = *counter;
        *counter = counter
            .checked_add(1)
            .unwrap_or_else(|| panic!("id space exhausted after {id} ids"));
        id
    }
}
